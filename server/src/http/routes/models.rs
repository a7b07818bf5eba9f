//! `GET /models`: descriptors and their runtime status.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use crossmind_domain::ProviderKind;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;

#[derive(Serialize)]
pub struct ModelStatus {
    pub id: String,
    pub display_name: String,
    pub provider_kind: ProviderKind,
    pub model_name: String,
    pub enabled: bool,
    /// Enabled and credential present.
    pub available: bool,
    /// Masked credential state, never the secret itself.
    pub credential: String,
    pub max_tokens: u32,
    pub cost_per_1k_tokens: f64,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub specialties: BTreeSet<String>,
}

pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.catalog.snapshot();
    let models: Vec<ModelStatus> = snapshot
        .iter()
        .map(|descriptor| {
            let has_credential = state.credentials.has(&descriptor.credential_ref);
            ModelStatus {
                id: descriptor.id.clone(),
                display_name: descriptor.display_name.clone(),
                provider_kind: descriptor.provider_kind,
                model_name: descriptor.model_name.clone(),
                enabled: descriptor.enabled,
                available: descriptor.enabled && has_credential,
                credential: state.credentials.masked(&descriptor.credential_ref),
                max_tokens: descriptor.max_tokens,
                cost_per_1k_tokens: descriptor.cost_per_1k_tokens,
                specialties: descriptor.specialties.clone(),
            }
        })
        .collect();

    Json(json!({
        "models": models,
        "default_models": snapshot.enabled_defaults(usize::MAX),
    }))
}
