//! `/consensus` and `/consensus/batch`.

use crate::http::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use crossmind_application::BatchOutput;
use crossmind_domain::{
    ConsensusMethod, ConsensusRequest, ConsensusResult, ErrorKind, ReasoningMethod,
};
use serde::Deserialize;

fn default_max_models() -> usize {
    5
}

fn default_temperature() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

fn default_chain_depth() -> u8 {
    2
}

/// Request body for a single consensus query. Unknown fields are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusBody {
    pub question: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
    #[serde(default = "default_max_models")]
    pub max_models: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
    #[serde(default = "default_true")]
    pub enable_caching: bool,
    #[serde(default)]
    pub enable_chain_of_thought: bool,
    #[serde(default)]
    pub reasoning_method: Option<String>,
    #[serde(default = "default_chain_depth")]
    pub chain_depth: u8,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

impl ConsensusBody {
    /// Resolve defaults against the catalog and build the engine request.
    /// Range validation happens in the domain layer.
    pub fn into_request(self, state: &AppState) -> Result<ConsensusRequest, ApiError> {
        let method: ConsensusMethod = match self.method.as_deref() {
            None => ConsensusMethod::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e: String| ApiError::new(ErrorKind::InvalidRequest, e))?,
        };
        let reasoning_method: ReasoningMethod = match self.reasoning_method.as_deref() {
            None => ReasoningMethod::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e: String| ApiError::new(ErrorKind::InvalidRequest, e))?,
        };
        if !(2..=10).contains(&self.max_models) {
            return Err(ApiError::new(
                ErrorKind::InvalidRequest,
                format!("max_models must lie within 2..=10, got {}", self.max_models),
            ));
        }

        let selected_model_ids = match self.models {
            Some(mut ids) => {
                ids.truncate(self.max_models);
                ids
            }
            None => state.catalog.snapshot().enabled_defaults(self.max_models),
        };

        Ok(ConsensusRequest {
            question: self.question,
            roles: self.roles.unwrap_or_default(),
            selected_model_ids,
            method,
            temperature: self.temperature,
            weights: self.weights,
            chain_depth: self.chain_depth,
            enable_chain_of_thought: self.enable_chain_of_thought,
            reasoning_method,
            enable_caching: self.enable_caching,
        })
    }
}

pub async fn single(
    State(state): State<AppState>,
    payload: Result<Json<ConsensusBody>, JsonRejection>,
) -> Result<Json<ConsensusResult>, ApiError> {
    let Json(body) =
        payload.map_err(|e| ApiError::new(ErrorKind::InvalidRequest, e.body_text()))?;
    let request = body.into_request(&state)?;
    let cancel = state.shutdown.child_token();
    let result = state.engine.execute(request, cancel).await?;
    Ok(Json(result))
}

/// Request body for a batch of consensus queries.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchBody {
    pub requests: Vec<ConsensusBody>,
}

pub async fn batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchBody>, JsonRejection>,
) -> Result<Json<BatchOutput>, ApiError> {
    let Json(body) =
        payload.map_err(|e| ApiError::new(ErrorKind::InvalidRequest, e.body_text()))?;

    let mut requests = Vec::with_capacity(body.requests.len());
    for entry in body.requests {
        requests.push(entry.into_request(&state)?);
    }

    let cancel = state.shutdown.child_token();
    let output = state.batch.execute(requests, cancel).await?;
    Ok(Json(output))
}
