//! Per-token, per-route-class token buckets.
//!
//! Each bucket starts full at its per-minute rate and refills continuously.
//! Buckets are in-memory per process; operators either front the service with
//! a single instance or accept per-instance budgets. The `Retry-After` hint
//! on exhaustion is the bucket's refill interval, rounded up to whole
//! seconds.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Route classes with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Consensus,
    Batch,
    ReadOnly,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Consensus => "consensus",
            RouteClass::Batch => "batch",
            RouteClass::ReadOnly => "read-only",
        }
    }
}

/// Requests per minute for each class.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub consensus_per_minute: u32,
    pub batch_per_minute: u32,
    pub read_only_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            consensus_per_minute: 60,
            batch_per_minute: 12,
            read_only_per_minute: 300,
        }
    }
}

impl RateLimitConfig {
    fn rate_for(&self, class: RouteClass) -> u32 {
        match class {
            RouteClass::Consensus => self.consensus_per_minute,
            RouteClass::Batch => self.batch_per_minute,
            RouteClass::ReadOnly => self.read_only_per_minute,
        }
        .max(1)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl BucketState {
    fn new(per_minute: u32) -> Self {
        Self {
            tokens: per_minute as f64,
            capacity: per_minute as f64,
            refill_per_sec: per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Refill for elapsed time, then take one token. `None` means admitted.
    fn try_acquire(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(refill_interval(self.refill_per_sec))
        }
    }
}

/// Refill interval rounded up to whole seconds.
fn refill_interval(refill_per_sec: f64) -> Duration {
    Duration::from_secs((1.0 / refill_per_sec).ceil().max(1.0) as u64)
}

/// Token buckets keyed `(token, route-class)` under per-key locking.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<(String, RouteClass), Mutex<BucketState>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Admit or reject one request. `Err` carries the `Retry-After` hint.
    pub fn check(&self, token: &str, class: RouteClass) -> Result<(), Duration> {
        let key = (token.to_string(), class);
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Mutex::new(BucketState::new(self.config.rate_for(class))));
        let mut state = match bucket.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match state.try_acquire() {
            None => Ok(()),
            Some(retry_after) => Err(retry_after),
        }
    }
}
