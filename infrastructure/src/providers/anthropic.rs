//! Adapter for the Anthropic Messages API.
//!
//! Auth travels in `x-api-key` plus the mandatory `anthropic-version` header;
//! the answer text is `content[0].text`.

use super::{
    excerpt, expired_reply, missing_credential_reply, parse_failure, status_failure, success_reply,
    transport_failure, ParsedCompletion,
};
use crate::config::credentials::CredentialStore;
use async_trait::async_trait;
use crossmind_application::Provider;
use crossmind_domain::{ProviderCall, ProviderKind, ProviderReply};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client, credentials: Arc<CredentialStore>) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl Provider for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AnthropicMessages
    }

    async fn invoke(&self, call: &ProviderCall) -> ProviderReply {
        let started = Instant::now();
        let remaining = call.remaining();
        if remaining.is_zero() {
            return expired_reply(call);
        }
        let Some(secret) = self.credentials.resolve(&call.descriptor.credential_ref) else {
            return missing_credential_reply(call, started);
        };

        let body = json!({
            "model": call.descriptor.model_name,
            "max_tokens": call.descriptor.max_tokens,
            "messages": [{"role": "user", "content": call.prompt}],
        });

        let response = self
            .client
            .post(&call.descriptor.endpoint_url)
            .header("x-api-key", secret)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(remaining)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => return transport_failure(call, started, err),
        };

        let status = response.status();
        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(err) => return transport_failure(call, started, err),
        };
        if !status.is_success() {
            return status_failure(call, started, status.as_u16(), excerpt(&raw));
        }

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => match parse_messages_response(&value) {
                Ok(parsed) => success_reply(call, parsed, started),
                Err(message) => parse_failure(call, started, message),
            },
            Err(err) => parse_failure(call, started, format!("invalid JSON payload: {err}")),
        }
    }
}

/// Extract `content[0].text` and usage counts.
fn parse_messages_response(value: &serde_json::Value) -> Result<ParsedCompletion, String> {
    let text = value
        .pointer("/content/0/text")
        .and_then(serde_json::Value::as_str)
        .ok_or("missing content[0].text")?;

    let usage = match (
        value
            .pointer("/usage/input_tokens")
            .and_then(serde_json::Value::as_u64),
        value
            .pointer("/usage/output_tokens")
            .and_then(serde_json::Value::as_u64),
    ) {
        (Some(input), Some(output)) => Some((input as u32, output as u32)),
        _ => None,
    };

    Ok(ParsedCompletion {
        text: text.to_string(),
        usage,
    })
}
