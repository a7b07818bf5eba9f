//! Provider calls and canonical replies.

use crate::core::descriptor::ModelDescriptor;
use crate::core::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One token is assumed to cover roughly this many characters when a vendor
/// does not report usage.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate a token count from text length.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() / CHARS_PER_TOKEN).max(1) as u32
}

/// Per-model unit of work handed to an adapter.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    /// Descriptor of the model being called.
    pub descriptor: Arc<ModelDescriptor>,
    /// Fully rendered prompt (question + role + reasoning scaffold).
    pub prompt: String,
    /// Effective temperature for this call.
    pub temperature: f64,
    /// Absolute instant the call must return by.
    pub deadline: Instant,
    /// 1-based attempt number; retries are scheduled by the engine.
    pub attempt: u32,
}

impl ProviderCall {
    pub fn model_id(&self) -> &str {
        &self.descriptor.id
    }

    /// Budget left before the shared deadline, zero when expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Copy of this call for the next retry attempt.
    pub fn next_attempt(&self) -> Self {
        let mut call = self.clone();
        call.attempt += 1;
        call
    }
}

/// Canonical vendor response, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReply {
    pub model_id: String,
    pub text: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Vendor HTTP status when one was observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(with = "crate::util::duration_secs")]
    pub latency: Duration,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// True when token counts came from the length heuristic.
    #[serde(default, skip_serializing_if = "crate::util::is_false")]
    pub tokens_estimated: bool,
    /// Provider-reported confidence, defaulted to 0.5.
    pub raw_confidence: f64,
}

impl ProviderReply {
    /// Creates a successful reply.
    pub fn success(model_id: impl Into<String>, text: impl Into<String>, latency: Duration) -> Self {
        Self {
            model_id: model_id.into(),
            text: text.into(),
            success: true,
            error_kind: None,
            error_detail: None,
            http_status: None,
            latency,
            prompt_tokens: 0,
            completion_tokens: 0,
            tokens_estimated: false,
            raw_confidence: 0.5,
        }
    }

    /// Creates a failed reply carrying the error kind.
    pub fn failure(
        model_id: impl Into<String>,
        kind: ErrorKind,
        detail: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            text: String::new(),
            success: false,
            error_kind: Some(kind),
            error_detail: Some(detail.into()),
            http_status: None,
            latency,
            prompt_tokens: 0,
            completion_tokens: 0,
            tokens_estimated: false,
            raw_confidence: 0.0,
        }
    }

    /// Attach vendor-reported token usage.
    pub fn with_tokens(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
        self.tokens_estimated = false;
        self
    }

    /// Fill token usage from the length heuristic.
    pub fn with_estimated_tokens(mut self, prompt: &str) -> Self {
        self.prompt_tokens = estimate_tokens(prompt);
        self.completion_tokens = estimate_tokens(&self.text);
        self.tokens_estimated = true;
        self
    }

    /// Attach the vendor HTTP status observed for this call.
    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Attach a provider-reported confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.raw_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Whether retrying this failure within the remaining budget has a
    /// non-trivial success probability: timeouts, 5xx responses, and
    /// connection-level failures qualify; 4xx and parse errors do not.
    pub fn is_transient(&self) -> bool {
        match self.error_kind {
            Some(ErrorKind::ProviderTimeout) | Some(ErrorKind::RateLimited) => true,
            Some(ErrorKind::ProviderHttpError) => self.http_status.map_or(true, |s| s >= 500),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_follows_length_heuristic() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
        // Even trivially short text counts as one token.
        assert_eq!(estimate_tokens("a"), 1);
    }

    #[test]
    fn estimated_tokens_are_flagged() {
        let reply = ProviderReply::success("m1", "four characters here", Duration::ZERO)
            .with_estimated_tokens("what?");
        assert!(reply.tokens_estimated);
        assert!(reply.completion_tokens >= 1);
    }

    #[test]
    fn transient_classification() {
        let timeout = ProviderReply::failure(
            "m1",
            ErrorKind::ProviderTimeout,
            "slice elapsed",
            Duration::ZERO,
        );
        assert!(timeout.is_transient());

        let server_error = ProviderReply::failure(
            "m1",
            ErrorKind::ProviderHttpError,
            "bad gateway",
            Duration::ZERO,
        )
        .with_http_status(502);
        assert!(server_error.is_transient());

        let client_error = ProviderReply::failure(
            "m1",
            ErrorKind::ProviderHttpError,
            "unauthorized",
            Duration::ZERO,
        )
        .with_http_status(401);
        assert!(!client_error.is_transient());

        // No status at all means a connection-level failure.
        let connection = ProviderReply::failure(
            "m1",
            ErrorKind::ProviderHttpError,
            "connection reset",
            Duration::ZERO,
        );
        assert!(connection.is_transient());

        let parse = ProviderReply::failure(
            "m1",
            ErrorKind::ProviderParseError,
            "no content",
            Duration::ZERO,
        );
        assert!(!parse.is_transient());
    }

    #[test]
    fn next_attempt_increments_only_attempt() {
        use crate::core::descriptor::{ModelDescriptor, ProviderKind};
        use std::collections::BTreeSet;

        let call = ProviderCall {
            descriptor: Arc::new(ModelDescriptor {
                id: "m1".to_string(),
                provider_kind: ProviderKind::OpenAiChat,
                endpoint_url: String::new(),
                model_name: String::new(),
                credential_ref: String::new(),
                max_tokens: 128,
                default_temperature: 0.7,
                enabled: true,
                cost_per_1k_tokens: 0.0,
                display_name: String::new(),
                specialties: BTreeSet::new(),
            }),
            prompt: "hello".to_string(),
            temperature: 0.7,
            deadline: Instant::now() + Duration::from_secs(5),
            attempt: 1,
        };

        let retry = call.next_attempt();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.prompt, call.prompt);
        assert_eq!(retry.deadline, call.deadline);
    }
}
