//! Provider port
//!
//! Defines the interface for invoking one LLM provider, and the registry that
//! resolves the right adapter for a model's provider kind once at startup.

use async_trait::async_trait;
use crossmind_domain::{ProviderCall, ProviderKind, ProviderReply};
use std::collections::HashMap;
use std::sync::Arc;

/// One vendor adapter.
///
/// Implementations turn a canonical [`ProviderCall`] into a vendor-specific
/// HTTP call and parse the response back into a canonical [`ProviderReply`].
/// An adapter never panics and never returns an error: any failure comes back
/// as a reply with `success=false` and an error kind. Adapters perform no
/// retries of their own; retry policy lives in the engine.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The wire protocol this adapter speaks.
    fn kind(&self) -> ProviderKind;

    /// Execute a single call, returning by the call's deadline.
    async fn invoke(&self, call: &ProviderCall) -> ProviderReply;
}

/// Adapter registry keyed by provider kind.
///
/// Resolution happens once per call with a plain map lookup; the closed set
/// of kinds means an unknown kind is a wiring bug, surfaced as `None`.
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Build the registry. When two adapters claim the same kind, the first
    /// registration wins.
    pub fn new(adapters: Vec<Arc<dyn Provider>>) -> Self {
        let mut map: HashMap<ProviderKind, Arc<dyn Provider>> = HashMap::new();
        for adapter in adapters {
            map.entry(adapter.kind()).or_insert(adapter);
        }
        Self { adapters: map }
    }

    /// Adapter for a provider kind, if one is registered.
    pub fn resolve(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        self.adapters.get(&kind).map(Arc::clone)
    }

    /// Registered kinds, for the health report.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
