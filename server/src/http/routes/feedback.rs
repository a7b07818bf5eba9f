//! `POST /feedback`: user ratings tied to a served consensus result.
//!
//! Feedback is write-only into analytics; it never feeds back into scoring
//! or model weighting.

use crate::http::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use crossmind_application::Analytics;
use crossmind_domain::{ErrorKind, FeedbackRecord};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackBody {
    pub consensus_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) =
        payload.map_err(|e| ApiError::new(ErrorKind::InvalidRequest, e.body_text()))?;

    if body.consensus_id.trim().is_empty() {
        return Err(ApiError::new(
            ErrorKind::InvalidRequest,
            "consensus_id must not be empty",
        ));
    }
    if !(1..=5).contains(&body.rating) {
        return Err(ApiError::new(
            ErrorKind::InvalidRequest,
            format!("rating must lie within 1..=5, got {}", body.rating),
        ));
    }

    state.analytics.record_feedback(FeedbackRecord {
        consensus_id: body.consensus_id,
        rating: body.rating,
        comment: body.comment,
        timestamp: Utc::now(),
    });

    Ok(Json(json!({ "recorded": true })))
}
