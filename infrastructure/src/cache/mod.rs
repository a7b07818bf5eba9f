//! Cache backends.
//!
//! `memory://` selects the in-process TTL cache; anything unresolvable
//! degrades to the null cache so a broken backend never takes requests down.

pub mod memory;

use crossmind_application::{ConsensusCache, NullCache};
use std::sync::Arc;
use tracing::warn;

/// Pick a cache backend from `CACHE_BACKEND_URL`.
pub fn cache_from_backend_url(url: &str) -> Arc<dyn ConsensusCache> {
    let scheme = url.split("://").next().unwrap_or("").trim();
    match scheme {
        "" | "memory" => Arc::new(memory::MemoryCache::default()),
        "null" | "none" => Arc::new(NullCache),
        other => {
            warn!(backend = %other, "unsupported cache backend, degrading to null cache");
            Arc::new(NullCache)
        }
    }
}
