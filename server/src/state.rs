//! Shared handler state.

use crossmind_application::{Analytics, ConsensusCache, RunBatchUseCase, RunConsensusUseCase};
use crossmind_domain::ModelCatalog;
use crossmind_infrastructure::{CredentialStore, RateLimiter};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Everything the handlers need, injected once at startup.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RunConsensusUseCase>,
    pub batch: Arc<RunBatchUseCase>,
    pub catalog: Arc<ModelCatalog>,
    pub analytics: Arc<dyn Analytics>,
    pub cache: Arc<dyn ConsensusCache>,
    pub credentials: Arc<CredentialStore>,
    /// Configured bearer tokens.
    pub api_keys: Arc<HashSet<String>>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Process-wide inflight request cap.
    pub inflight: Arc<Semaphore>,
    /// Root token; per-request tokens are children of this one.
    pub shutdown: CancellationToken,
    /// Number of registered provider adapters, for the health report.
    pub provider_count: usize,
}
