//! `DELETE /cache`: admin-only invalidation by key pattern.

use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use crossmind_application::ConsensusCache;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct InvalidateParams {
    /// Key pattern; a trailing `*` matches any suffix. Defaults to all
    /// cached results.
    #[serde(default)]
    pub pattern: Option<String>,
}

pub async fn invalidate(
    State(state): State<AppState>,
    Query(params): Query<InvalidateParams>,
) -> Json<serde_json::Value> {
    let pattern = params.pattern.unwrap_or_else(|| "res:*".to_string());
    let removed = state.cache.invalidate(&pattern).await;
    info!(pattern = %pattern, removed, "cache invalidated");
    Json(json!({ "pattern": pattern, "removed": removed }))
}
