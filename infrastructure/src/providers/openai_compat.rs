//! Adapter for OpenAI-compatible chat completion APIs.
//!
//! OpenAI, Moonshot, Zhipu, and Mistral all accept the same request shape
//! (`{model, messages, temperature, max_tokens}` with bearer auth) and answer
//! with `choices[0].message.content`, so one adapter parameterised by kind
//! covers all four.

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

pub struct OpenAiCompatAdapter {
    kind: ProviderKind,
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl OpenAiCompatAdapter {
    pub fn new(kind: ProviderKind, client: reqwest::Client, credentials: Arc<CredentialStore>) -> Self {
        debug_assert!(kind.is_openai_compatible());
        Self {
            kind,
            client,
            credentials,
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
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
            "messages": [{"role": "user", "content": call.prompt}],
            "temperature": call.temperature,
            "max_tokens": call.descriptor.max_tokens,
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
            Ok(value) => match parse_chat_completion(&value) {
                Ok(parsed) => success_reply(call, parsed, started),
                Err(message) => parse_failure(call, started, message),
            },
            Err(err) => parse_failure(call, started, format!("invalid JSON payload: {err}")),
        }
    }
}

/// Extract `choices[0].message.content` and usage counts.
fn parse_chat_completion(value: &serde_json::Value) -> Result<ParsedCompletion, String> {
    let text = value
        .pointer("/choices/0/message/content")
        .and_then(serde_json::Value::as_str)
        .ok_or("missing choices[0].message.content")?;

    let usage = match (
        value
            .pointer("/usage/prompt_tokens")
            .and_then(serde_json::Value::as_u64),
        value
            .pointer("/usage/completion_tokens")
            .and_then(serde_json::Value::as_u64),
    ) {
        (Some(prompt), Some(completion)) => Some((prompt as u32, completion as u32)),
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
    fn parses_content_and_usage() {
        let payload = json!({
            "choices": [{"message": {"role": "assistant", "content": "4"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1}
        });
        let parsed = parse_chat_completion(&payload).unwrap();
        assert_eq!(parsed.text, "4");
        assert_eq!(parsed.usage, Some((12, 1)));
    }

    #[test]
    fn missing_usage_is_tolerated() {
        let payload = json!({
            "choices": [{"message": {"content": "hello"}}]
        });
        let parsed = parse_chat_completion(&payload).unwrap();
        assert_eq!(parsed.text, "hello");
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn empty_choices_is_a_parse_error() {
        let payload = json!({"choices": []});
        assert!(parse_chat_completion(&payload).is_err());
    }

    #[tokio::test]
    async fn missing_credential_fails_without_network() {
        let adapter = OpenAiCompatAdapter::new(
            ProviderKind::OpenAiChat,
            reqwest::Client::new(),
            Arc::new(CredentialStore::default()),
        );
        let call = super::super::test_support::call(ProviderKind::OpenAiChat, "ABSENT_KEY");
        let reply = adapter.invoke(&call).await;
        assert!(!reply.success);
    }
}
