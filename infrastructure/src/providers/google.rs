//! Adapter for the Google generateContent API.
//!
//! The credential travels as a `key` query parameter; the answer text is
//! `candidates[0].content.parts[0].text`.

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

pub struct GoogleAdapter {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl GoogleAdapter {
    pub fn new(client: reqwest::Client, credentials: Arc<CredentialStore>) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl Provider for GoogleAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleGenerate
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
            "contents": [{"parts": [{"text": call.prompt}]}],
            "generationConfig": {
                "temperature": call.temperature,
                "maxOutputTokens": call.descriptor.max_tokens,
            },
        });

        let response = self
            .client
            .post(&call.descriptor.endpoint_url)
            .query(&[("key", secret)])
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
            Ok(value) => match parse_generate_response(&value) {
                Ok(parsed) => success_reply(call, parsed, started),
                Err(message) => parse_failure(call, started, message),
            },
            Err(err) => parse_failure(call, started, format!("invalid JSON payload: {err}")),
        }
    }
}

/// Extract `candidates[0].content.parts[0].text` and usage metadata.
fn parse_generate_response(value: &serde_json::Value) -> Result<ParsedCompletion, String> {
    let text = value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(serde_json::Value::as_str)
        .ok_or("missing candidates[0].content.parts[0].text")?;

    let usage = match (
        value
            .pointer("/usageMetadata/promptTokenCount")
            .and_then(serde_json::Value::as_u64),
        value
            .pointer("/usageMetadata/candidatesTokenCount")
            .and_then(serde_json::Value::as_u64),
    ) {
        (Some(prompt), Some(candidates)) => Some((prompt as u32, candidates as u32)),
        _ => None,
    };

    Ok(ParsedCompletion {
        text: text.to_string(),
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_candidate_text() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"text": "4"}]}}],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 1}
        });
        let parsed = parse_generate_response(&payload).unwrap();
        assert_eq!(parsed.text, "4");
        assert_eq!(parsed.usage, Some((8, 1)));
    }

    #[test]
    fn blocked_response_is_a_parse_error() {
        let payload = json!({"candidates": []});
        assert!(parse_generate_response(&payload).is_err());
    }
}
