//! Application layer for crossmind
//!
//! Defines the ports the consensus engine depends on (providers, embeddings,
//! cache, analytics) and the use cases that orchestrate them. Adapters live in
//! the infrastructure layer and are injected at startup.

pub mod ports;
pub mod use_cases;

pub use ports::analytics::{Analytics, NoAnalytics};
pub use ports::cache::{ConsensusCache, NullCache};
pub use ports::embedder::{EmbedError, Embedder};
pub use ports::provider::{Provider, ProviderRegistry};
pub use use_cases::run_batch::{
    BatchEntryOutcome, BatchError, BatchOutput, BatchSummary, RunBatchUseCase, MAX_BATCH_SIZE,
};
pub use use_cases::run_consensus::{EngineConfig, EngineError, RunConsensusUseCase};
