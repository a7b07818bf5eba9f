//! `GET /health`: liveness plus coarse dependency state. Unauthenticated.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use crossmind_application::{Analytics, ConsensusCache};
use serde_json::json;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.catalog.snapshot();
    let enabled_models = snapshot.iter().filter(|m| m.enabled).count();

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "api": "up",
            "cache": state.cache.backend_name(),
            "analytics_backlog": state.analytics.backlog(),
        },
        "models": {
            "registered": snapshot.len(),
            "enabled": enabled_models,
            "providers": state.provider_count,
        },
    }))
}
