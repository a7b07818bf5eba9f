//! In-memory TTL cache.
//!
//! Results live in a concurrent map keyed `res:<fingerprint>` with
//! per-entry expiry; embeddings sit in a bounded LRU keyed `emb:<hash>`.
//! Values are stored as compact JSON bytes, so a cached result replays
//! byte-identically within its TTL. Expired entries are dropped lazily on
//! read.

use async_trait::async_trait;
use crossmind_application::ConsensusCache;
use crossmind_domain::ConsensusResult;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

const DEFAULT_EMBEDDING_CAPACITY: usize = 10_000;

struct TimedEntry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

struct TimedEmbedding {
    vector: Vec<f32>,
    expires_at: Instant,
}

pub struct MemoryCache {
    results: DashMap<String, TimedEntry>,
    embeddings: Mutex<LruCache<String, TimedEmbedding>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new(embedding_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(embedding_capacity.max(1))
            .unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is non-zero"));
        Self {
            results: DashMap::new(),
            embeddings: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn result_key(fingerprint: &str) -> String {
        format!("res:{fingerprint}")
    }

    fn embedding_key(text_hash: &str) -> String {
        format!("emb:{text_hash}")
    }

    fn matches(pattern: &str, key: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        }
    }
}

#[async_trait]
impl ConsensusCache for MemoryCache {
    async fn get_result(&self, fingerprint: &str) -> Option<ConsensusResult> {
        let key = Self::result_key(fingerprint);
        let expired = match self.results.get(&key) {
            None => return None,
            Some(entry) if entry.expires_at <= Instant::now() => true,
            Some(entry) => {
                match serde_json::from_slice(&entry.bytes) {
                    Ok(result) => return Some(result),
                    Err(e) => {
                        warn!("dropping undecodable cache entry: {e}");
                        true
                    }
                }
            }
        };
        if expired {
            self.results.remove(&key);
        }
        None
    }

    async fn put_result(&self, fingerprint: &str, result: &ConsensusResult, ttl: Duration) {
        match serde_json::to_vec(result) {
            Ok(bytes) => {
                self.results.insert(
                    Self::result_key(fingerprint),
                    TimedEntry {
                        bytes,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            Err(e) => warn!("refusing to cache unencodable result: {e}"),
        }
    }

    async fn get_embedding(&self, text_hash: &str) -> Option<Vec<f32>> {
        let key = Self::embedding_key(text_hash);
        let mut embeddings = self.embeddings.lock().ok()?;
        match embeddings.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.vector.clone()),
            Some(_) => {
                embeddings.pop(&key);
                None
            }
            None => None,
        }
    }

    async fn put_embedding(&self, text_hash: &str, vector: &[f32], ttl: Duration) {
        if let Ok(mut embeddings) = self.embeddings.lock() {
            embeddings.put(
                Self::embedding_key(text_hash),
                TimedEmbedding {
                    vector: vector.to_vec(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    async fn invalidate(&self, pattern: &str) -> usize {
        let mut removed = 0;

        let result_keys: Vec<String> = self
            .results
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| Self::matches(pattern, key))
            .collect();
        for key in result_keys {
            if self.results.remove(&key).is_some() {
                removed += 1;
            }
        }

        if let Ok(mut embeddings) = self.embeddings.lock() {
            let embedding_keys: Vec<String> = embeddings
                .iter()
                .map(|(key, _)| key.clone())
                .filter(|key| Self::matches(pattern, key))
                .collect();
            for key in embedding_keys {
                if embeddings.pop(&key).is_some() {
                    removed += 1;
                }
            }
        }

        removed
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
