//! Cache port
//!
//! Stores finished consensus results keyed by request fingerprint and
//! embeddings keyed by text hash. A miss is never an error, and a broken
//! backend degrades to [`NullCache`], which always misses and silently
//! accepts writes, so the engine keeps serving.

use async_trait::async_trait;
use crossmind_domain::ConsensusResult;
use std::time::Duration;

/// Request-level and embedding cache
#[async_trait]
pub trait ConsensusCache: Send + Sync {
    /// Fetch a finished result by fingerprint.
    async fn get_result(&self, fingerprint: &str) -> Option<ConsensusResult>;

    /// Store a finished result under its fingerprint.
    async fn put_result(&self, fingerprint: &str, result: &ConsensusResult, ttl: Duration);

    /// Fetch an embedding by text hash.
    async fn get_embedding(&self, text_hash: &str) -> Option<Vec<f32>>;

    /// Store an embedding under its text hash.
    async fn put_embedding(&self, text_hash: &str, vector: &[f32], ttl: Duration);

    /// Drop entries whose key matches the pattern (admin-only). A trailing
    /// `*` matches any suffix. Returns the number of entries removed.
    async fn invalidate(&self, pattern: &str) -> usize;

    /// Short backend label for the health report.
    fn backend_name(&self) -> &'static str;
}

/// Cache that never hits. Stands in when no backend is reachable.
pub struct NullCache;

#[async_trait]
impl ConsensusCache for NullCache {
    async fn get_result(&self, _fingerprint: &str) -> Option<ConsensusResult> {
        None
    }

    async fn put_result(&self, _fingerprint: &str, _result: &ConsensusResult, _ttl: Duration) {}

    async fn get_embedding(&self, _text_hash: &str) -> Option<Vec<f32>> {
        None
    }

    async fn put_embedding(&self, _text_hash: &str, _vector: &[f32], _ttl: Duration) {}

    async fn invalidate(&self, _pattern: &str) -> usize {
        0
    }

    fn backend_name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_cache_always_misses() {
        let cache = NullCache;
        cache.put_embedding("abc", &[1.0, 0.0], Duration::from_secs(60)).await;
        assert!(cache.get_embedding("abc").await.is_none());
        assert!(cache.get_result("fp").await.is_none());
        assert_eq!(cache.invalidate("*").await, 0);
    }
}
