//! Adapter for the Cohere generate API.
//!
//! Plain bearer auth; the answer text is `generations[0].text`.

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

pub struct CohereAdapter {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl CohereAdapter {
    pub fn new(client: reqwest::Client, credentials: Arc<CredentialStore>) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl Provider for CohereAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CohereGenerate
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
            "prompt": call.prompt,
            "max_tokens": call.descriptor.max_tokens,
            "temperature": call.temperature,
        });

        let response = self
            .client
            .post(&call.descriptor.endpoint_url)
            .bearer_auth(secret)
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

/// Extract `generations[0].text`. Cohere reports no usable token usage on
/// this endpoint, so counts are always estimated.
fn parse_generate_response(value: &serde_json::Value) -> Result<ParsedCompletion, String> {
    let text = value
        .pointer("/generations/0/text")
        .and_then(serde_json::Value::as_str)
        .ok_or("missing generations[0].text")?;

    Ok(ParsedCompletion {
        text: text.trim().to_string(),
        usage: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_and_trims_generation_text() {
        let payload = json!({"generations": [{"text": " 4\n"}]});
        let parsed = parse_generate_response(&payload).unwrap();
        assert_eq!(parsed.text, "4");
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn empty_generations_is_a_parse_error() {
        let payload = json!({"generations": []});
        assert!(parse_generate_response(&payload).is_err());
    }
}
