//! Server settings with multi-source merging.
//!
//! Priority (highest to lowest): environment variables, the TOML config file,
//! built-in defaults. The environment surface is intentionally small and
//! matches the deployment contract (`BACKEND_API_KEYS`, `CACHE_BACKEND_URL`,
//! timeouts, thresholds, CORS origins).

use crate::ratelimit::bucket::RateLimitConfig;
use crossmind_application::EngineConfig;
use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Severity of a configuration issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One problem found while validating the configuration
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub message: String,
}

impl ConfigIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Rate limits per route class, in requests per minute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub consensus_per_minute: u32,
    pub batch_per_minute: u32,
    pub read_only_per_minute: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            consensus_per_minute: 60,
            batch_per_minute: 12,
            read_only_per_minute: 300,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP listener binds to.
    pub bind_addr: String,
    /// Path to the model descriptor file (YAML or JSON).
    pub models_file: PathBuf,
    /// Comma-separated bearer tokens. Required and non-empty at startup.
    pub backend_api_keys: String,
    /// Cache backend; `memory://` is the in-process TTL cache, anything
    /// unresolvable degrades to the null cache.
    pub cache_backend_url: String,
    pub cache_ttl_seconds: u64,
    pub embedding_cache_ttl_seconds: u64,
    /// Shared per-request budget.
    pub request_timeout_seconds: u64,
    /// Fan-out width cap per request.
    pub max_concurrent_requests: usize,
    /// Process-wide inflight request cap.
    pub max_inflight_requests: usize,
    pub min_success: usize,
    pub max_retries: u32,
    /// Comma-separated CORS allow-list. Empty means CORS stays off; there is
    /// no wildcard default.
    pub allowed_origins: String,
    pub low_consensus_threshold: f64,
    pub high_consensus_threshold: f64,
    /// Directory for analytics JSONL persistence; memory-only when unset.
    pub analytics_dir: Option<PathBuf>,
    pub analytics_max_backlog: usize,
    pub analytics_retention_days: u32,
    pub rate_limit: RateLimitSection,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            models_file: PathBuf::from("config/models.yaml"),
            backend_api_keys: String::new(),
            cache_backend_url: "memory://".to_string(),
            cache_ttl_seconds: 3600,
            embedding_cache_ttl_seconds: 86_400,
            request_timeout_seconds: 30,
            max_concurrent_requests: 10,
            max_inflight_requests: 256,
            min_success: 2,
            max_retries: 2,
            allowed_origins: String::new(),
            low_consensus_threshold: 0.85,
            high_consensus_threshold: 0.90,
            analytics_dir: None,
            analytics_max_backlog: 10_000,
            analytics_retention_days: 30,
            rate_limit: RateLimitSection::default(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources with proper priority.
    pub fn load(config_path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        } else {
            let default_path = PathBuf::from("crossmind.toml");
            if default_path.exists() {
                figment = figment.merge(Toml::file(&default_path));
            }
        }
        let mut settings: Settings = figment.extract().map_err(Box::new)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Environment variables take priority over everything.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("BACKEND_API_KEYS") {
            self.backend_api_keys = value;
        }
        if let Ok(value) = std::env::var("CACHE_BACKEND_URL") {
            self.cache_backend_url = value;
        }
        if let Ok(value) = std::env::var("ALLOWED_ORIGINS") {
            self.allowed_origins = value;
        }
        Self::override_parsed("CACHE_TTL_SECONDS", &mut self.cache_ttl_seconds);
        Self::override_parsed("REQUEST_TIMEOUT_SECONDS", &mut self.request_timeout_seconds);
        Self::override_parsed("MAX_CONCURRENT_REQUESTS", &mut self.max_concurrent_requests);
        Self::override_parsed("LOW_CONSENSUS_THRESHOLD", &mut self.low_consensus_threshold);
        Self::override_parsed("HIGH_CONSENSUS_THRESHOLD", &mut self.high_consensus_threshold);
    }

    fn override_parsed<T: std::str::FromStr>(name: &str, slot: &mut T) {
        if let Ok(raw) = std::env::var(name) {
            match raw.trim().parse() {
                Ok(value) => *slot = value,
                Err(_) => warn!("ignoring unparseable {name}={raw}"),
            }
        }
    }

    /// Bearer tokens, one per comma-separated entry.
    pub fn api_keys(&self) -> Vec<String> {
        self.backend_api_keys
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// CORS allow-list, one origin per comma-separated entry.
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Engine tunables derived from these settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            max_retries: self.max_retries,
            min_success: self.min_success,
            low_consensus_threshold: self.low_consensus_threshold,
            high_consensus_threshold: self.high_consensus_threshold,
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            embedding_cache_ttl: Duration::from_secs(self.embedding_cache_ttl_seconds),
            max_fanout: self.max_concurrent_requests,
        }
    }

    /// Retention window for analytics rows.
    pub fn analytics_retention(&self) -> Duration {
        Duration::from_secs(self.analytics_retention_days.max(1) as u64 * 86_400)
    }

    /// Rate limiter configuration derived from these settings.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            consensus_per_minute: self.rate_limit.consensus_per_minute,
            batch_per_minute: self.rate_limit.batch_per_minute,
            read_only_per_minute: self.rate_limit.read_only_per_minute,
        }
    }

    /// Check the configuration. Errors abort startup with exit code 1.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.api_keys().is_empty() {
            issues.push(ConfigIssue::error(
                "BACKEND_API_KEYS is required and must list at least one token",
            ));
        }
        for (name, value) in [
            ("low_consensus_threshold", self.low_consensus_threshold),
            ("high_consensus_threshold", self.high_consensus_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                issues.push(ConfigIssue::error(format!(
                    "{name} must lie within 0.0..=1.0, got {value}"
                )));
            }
        }
        if self.low_consensus_threshold > self.high_consensus_threshold {
            issues.push(ConfigIssue::error(
                "low_consensus_threshold must not exceed high_consensus_threshold",
            ));
        }
        if self.request_timeout_seconds == 0 {
            issues.push(ConfigIssue::error("request_timeout_seconds must be positive"));
        }
        if self.min_success == 0 {
            issues.push(ConfigIssue::error("min_success must be at least 1"));
        }
        if self.max_concurrent_requests == 0 || self.max_concurrent_requests > 10 {
            issues.push(ConfigIssue::error(
                "max_concurrent_requests must lie within 1..=10",
            ));
        }
        if self.allowed_origins.trim() == "*" {
            issues.push(ConfigIssue::warning(
                "wildcard CORS origin is not honoured; list origins explicitly",
            ));
        }

        issues
    }

    pub fn has_errors(issues: &[ConfigIssue]) -> bool {
        issues.iter().any(|i| i.severity == Severity::Error)
    }
}
