//! Infrastructure layer for crossmind
//!
//! Concrete adapters behind the application ports: per-vendor HTTP providers,
//! the local embedder, cache backends, the analytics hub, the token-bucket
//! rate limiter, and configuration loading.

pub mod analytics;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod providers;
pub mod ratelimit;

pub use analytics::sink::AnalyticsHub;
pub use cache::{cache_from_backend_url, memory::MemoryCache};
pub use config::{
    credentials::CredentialStore,
    models_file::{ModelsFile, ModelsFileError},
    settings::{ConfigIssue, Settings, Severity},
};
pub use embedding::hash::HashingEmbedder;
pub use providers::{build_provider_registry, client::shared_http_client};
pub use ratelimit::bucket::{RateLimitConfig, RateLimiter, RouteClass};
