//! Model descriptors and the process-wide catalog.
//!
//! A [`ModelDescriptor`] is an immutable configuration entry loaded at
//! startup. The [`ModelCatalog`] holds the active set behind a copy-on-write
//! snapshot so readers always see a consistent table while an explicit config
//! reload swaps it atomically.

use crate::core::error::ErrorKind;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Supported provider wire protocols (Value Object)
///
/// One concrete adapter exists per kind; a registry keyed by this enum
/// resolves the adapter once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAiChat,
    AnthropicMessages,
    GoogleGenerate,
    CohereGenerate,
    ZhipuChat,
    BaiduErnie,
    MoonshotChat,
    MistralChat,
}

impl ProviderKind {
    /// Get the string identifier for this provider kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiChat => "openai-chat",
            ProviderKind::AnthropicMessages => "anthropic-messages",
            ProviderKind::GoogleGenerate => "google-generate",
            ProviderKind::CohereGenerate => "cohere-generate",
            ProviderKind::ZhipuChat => "zhipu-chat",
            ProviderKind::BaiduErnie => "baidu-ernie",
            ProviderKind::MoonshotChat => "moonshot-chat",
            ProviderKind::MistralChat => "mistral-chat",
        }
    }

    /// All kinds, in a stable order
    pub fn all() -> [ProviderKind; 8] {
        [
            ProviderKind::OpenAiChat,
            ProviderKind::AnthropicMessages,
            ProviderKind::GoogleGenerate,
            ProviderKind::CohereGenerate,
            ProviderKind::ZhipuChat,
            ProviderKind::BaiduErnie,
            ProviderKind::MoonshotChat,
            ProviderKind::MistralChat,
        ]
    }

    /// Whether this kind speaks the OpenAI chat-completions wire format.
    pub fn is_openai_compatible(&self) -> bool {
        matches!(
            self,
            ProviderKind::OpenAiChat
                | ProviderKind::MoonshotChat
                | ProviderKind::ZhipuChat
                | ProviderKind::MistralChat
        )
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "openai-chat" => ProviderKind::OpenAiChat,
            "anthropic-messages" => ProviderKind::AnthropicMessages,
            "google-generate" => ProviderKind::GoogleGenerate,
            "cohere-generate" => ProviderKind::CohereGenerate,
            "zhipu-chat" => ProviderKind::ZhipuChat,
            "baidu-ernie" => ProviderKind::BaiduErnie,
            "moonshot-chat" => ProviderKind::MoonshotChat,
            "mistral-chat" => ProviderKind::MistralChat,
            other => return Err(format!("unknown provider kind: {other}")),
        })
    }
}

impl Serialize for ProviderKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Immutable configuration entry for one model, loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique identifier referenced by requests
    pub id: String,
    /// Which adapter handles this model
    pub provider_kind: ProviderKind,
    /// Vendor endpoint the adapter posts to
    pub endpoint_url: String,
    /// Vendor-side model name
    pub model_name: String,
    /// Name of the environment variable holding the credential
    pub credential_ref: String,
    /// Completion token ceiling per call
    pub max_tokens: u32,
    /// Temperature used when the request does not override it
    pub default_temperature: f64,
    /// Disabled descriptors are listed but never called
    pub enabled: bool,
    /// Rough pricing used for cost estimates in analytics
    pub cost_per_1k_tokens: f64,
    /// Human-facing name
    pub display_name: String,
    /// Optional capability tags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub specialties: BTreeSet<String>,
}

impl ModelDescriptor {
    /// Rough cost estimate for a call with the given token counts.
    pub fn cost_estimate(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let total = prompt_tokens as f64 + completion_tokens as f64;
        total / 1000.0 * self.cost_per_1k_tokens
    }
}

/// Errors raised while building or replacing the catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("duplicate model id: {0}")]
    DuplicateId(String),

    #[error("default model references unknown id: {0}")]
    UnknownDefault(String),

    #[error("unknown model id: {0}")]
    UnknownModel(String),

    #[error("model is disabled: {0}")]
    ModelDisabled(String),
}

impl CatalogError {
    /// Catalog lookup failures surface as request validation errors.
    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::InvalidRequest
    }
}

/// A consistent, immutable view of the descriptor table.
#[derive(Debug)]
pub struct CatalogSnapshot {
    models: Vec<Arc<ModelDescriptor>>,
    by_id: HashMap<String, usize>,
    default_models: Vec<String>,
}

impl CatalogSnapshot {
    fn build(
        models: Vec<ModelDescriptor>,
        default_models: Vec<String>,
    ) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(models.len());
        let models: Vec<Arc<ModelDescriptor>> = models.into_iter().map(Arc::new).collect();
        for (idx, model) in models.iter().enumerate() {
            if by_id.insert(model.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateId(model.id.clone()));
            }
        }
        for id in &default_models {
            if !by_id.contains_key(id) {
                return Err(CatalogError::UnknownDefault(id.clone()));
            }
        }
        Ok(Self {
            models,
            by_id,
            default_models,
        })
    }

    /// Look up a descriptor by id.
    pub fn get(&self, id: &str) -> Option<&Arc<ModelDescriptor>> {
        self.by_id.get(id).map(|idx| &self.models[*idx])
    }

    /// Resolve an id to an enabled descriptor, or explain why not.
    pub fn resolve_enabled(&self, id: &str) -> Result<Arc<ModelDescriptor>, CatalogError> {
        let model = self
            .get(id)
            .ok_or_else(|| CatalogError::UnknownModel(id.to_string()))?;
        if !model.enabled {
            return Err(CatalogError::ModelDisabled(id.to_string()));
        }
        Ok(Arc::clone(model))
    }

    /// All descriptors, in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.iter()
    }

    /// Number of descriptors (enabled or not).
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Enabled default model ids, capped at `max`.
    pub fn enabled_defaults(&self, max: usize) -> Vec<String> {
        self.default_models
            .iter()
            .filter(|id| self.get(id).map(|m| m.enabled).unwrap_or(false))
            .take(max)
            .cloned()
            .collect()
    }
}

/// Read-mostly descriptor table with atomic replace.
///
/// Readers grab a [`CatalogSnapshot`] and keep working against it even if a
/// reload swaps the table underneath them.
pub struct ModelCatalog {
    inner: RwLock<Arc<CatalogSnapshot>>,
}

impl ModelCatalog {
    /// Build the catalog. Duplicate ids and unknown defaults are rejected.
    pub fn new(
        models: Vec<ModelDescriptor>,
        default_models: Vec<String>,
    ) -> Result<Self, CatalogError> {
        let snapshot = CatalogSnapshot::build(models, default_models)?;
        Ok(Self {
            inner: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Current consistent view of the table.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.inner
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }

    /// Atomically replace the whole table (explicit config reload).
    pub fn replace(
        &self,
        models: Vec<ModelDescriptor>,
        default_models: Vec<String>,
    ) -> Result<(), CatalogError> {
        let snapshot = Arc::new(CatalogSnapshot::build(models, default_models)?);
        match self.inner.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, enabled: bool) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            provider_kind: ProviderKind::OpenAiChat,
            endpoint_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model_name: "gpt-4o".to_string(),
            credential_ref: "OPENAI_API_KEY".to_string(),
            max_tokens: 512,
            default_temperature: 0.6,
            enabled,
            cost_per_1k_tokens: 0.01,
            display_name: id.to_string(),
            specialties: BTreeSet::new(),
        }
    }

    #[test]
    fn provider_kind_roundtrip() {
        for kind in ProviderKind::all() {
            let parsed: ProviderKind = kind.as_str().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn openai_compatible_family() {
        assert!(ProviderKind::ZhipuChat.is_openai_compatible());
        assert!(ProviderKind::MistralChat.is_openai_compatible());
        assert!(!ProviderKind::AnthropicMessages.is_openai_compatible());
        assert!(!ProviderKind::BaiduErnie.is_openai_compatible());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = ModelCatalog::new(
            vec![descriptor("m1", true), descriptor("m1", true)],
            vec![],
        );
        assert!(matches!(result, Err(CatalogError::DuplicateId(_))));
    }

    #[test]
    fn unknown_default_is_rejected() {
        let result = ModelCatalog::new(vec![descriptor("m1", true)], vec!["ghost".to_string()]);
        assert!(matches!(result, Err(CatalogError::UnknownDefault(_))));
    }

    #[test]
    fn resolve_enabled_rejects_disabled_models() {
        let catalog = ModelCatalog::new(
            vec![descriptor("up", true), descriptor("down", false)],
            vec![],
        )
        .unwrap();
        let snapshot = catalog.snapshot();

        assert!(snapshot.resolve_enabled("up").is_ok());
        assert!(matches!(
            snapshot.resolve_enabled("down"),
            Err(CatalogError::ModelDisabled(_))
        ));
        assert!(matches!(
            snapshot.resolve_enabled("missing"),
            Err(CatalogError::UnknownModel(_))
        ));
    }

    #[test]
    fn replace_swaps_table_but_old_snapshot_survives() {
        let catalog =
            ModelCatalog::new(vec![descriptor("m1", true)], vec!["m1".to_string()]).unwrap();
        let before = catalog.snapshot();

        catalog
            .replace(vec![descriptor("m2", true)], vec!["m2".to_string()])
            .unwrap();

        assert!(before.get("m1").is_some());
        let after = catalog.snapshot();
        assert!(after.get("m1").is_none());
        assert!(after.get("m2").is_some());
    }

    #[test]
    fn enabled_defaults_skip_disabled_and_cap() {
        let catalog = ModelCatalog::new(
            vec![
                descriptor("a", true),
                descriptor("b", false),
                descriptor("c", true),
                descriptor("d", true),
            ],
            vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "d".to_string(),
            ],
        )
        .unwrap();

        let defaults = catalog.snapshot().enabled_defaults(2);
        assert_eq!(defaults, vec!["a".to_string(), "c".to_string()]);
    }
}
