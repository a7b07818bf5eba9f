//! Adapter for Baidu ERNIE.
//!
//! Two-step flow: exchange the API key and secret for an OAuth access token
//! (cached for thirty minutes), then post the chat payload with the token in
//! the query string. The answer text is the top-level `result` field.

use super::{
    excerpt, expired_reply, missing_credential_reply, parse_failure, status_failure, success_reply,
    transport_failure, ParsedCompletion,
};
use crate::config::credentials::CredentialStore;
use async_trait::async_trait;
use crossmind_application::Provider;
use crossmind_domain::{ErrorKind, ProviderCall, ProviderKind, ProviderReply};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_OAUTH_URL: &str = "https://aip.baidubce.com/oauth/2.0/token";
const TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Name of the secondary secret derived from the primary credential
/// reference (`ERNIE_API_KEY` pairs with `ERNIE_SECRET_KEY`).
pub fn ernie_secret_ref(credential_ref: &str) -> String {
    match credential_ref.strip_suffix("_API_KEY") {
        Some(stem) => format!("{stem}_SECRET_KEY"),
        None => format!("{credential_ref}_SECRET"),
    }
}

struct CachedToken {
    token: String,
    fetched: Instant,
}

pub struct ErnieAdapter {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
    oauth_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl ErnieAdapter {
    pub fn new(client: reqwest::Client, credentials: Arc<CredentialStore>) -> Self {
        Self {
            client,
            credentials,
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Point the token exchange at a different endpoint. Test hook.
    pub fn with_oauth_url(mut self, oauth_url: impl Into<String>) -> Self {
        self.oauth_url = oauth_url.into();
        self
    }

    /// Cached access token, refreshed through the OAuth exchange when absent
    /// or older than the TTL.
    async fn access_token(
        &self,
        api_key: &str,
        secret_key: &str,
        budget: Duration,
    ) -> Result<String, (ErrorKind, String)> {
        let mut slot = self.token.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fetched.elapsed() < TOKEN_TTL {
                return Ok(cached.token.clone());
            }
        }

        debug!("refreshing ERNIE access token");
        let response = self
            .client
            .post(&self.oauth_url)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", api_key),
                ("client_secret", secret_key),
            ])
            .timeout(budget)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    (ErrorKind::ProviderTimeout, "token exchange timed out".to_string())
                } else {
                    (ErrorKind::ProviderHttpError, format!("token exchange failed: {e}"))
                }
            })?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| (ErrorKind::ProviderParseError, format!("token payload: {e}")))?;
        let token = value
            .get("access_token")
            .and_then(serde_json::Value::as_str)
            .ok_or((
                ErrorKind::ProviderParseError,
                "token payload missing access_token".to_string(),
            ))?
            .to_string();

        *slot = Some(CachedToken {
            token: token.clone(),
            fetched: Instant::now(),
        });
        Ok(token)
    }
}

#[async_trait]
impl Provider for ErnieAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BaiduErnie
    }

    async fn invoke(&self, call: &ProviderCall) -> ProviderReply {
        let started = Instant::now();
        let remaining = call.remaining();
        if remaining.is_zero() {
            return expired_reply(call);
        }

        let Some(api_key) = self.credentials.resolve(&call.descriptor.credential_ref) else {
            return missing_credential_reply(call, started);
        };
        let secret_ref = ernie_secret_ref(&call.descriptor.credential_ref);
        let Some(secret_key) = self.credentials.resolve(&secret_ref) else {
            return missing_credential_reply(call, started);
        };

        let token = match self.access_token(api_key, secret_key, remaining).await {
            Ok(token) => token,
            Err((kind, detail)) => {
                return ProviderReply::failure(call.model_id(), kind, detail, started.elapsed())
            }
        };

        let remaining = call.remaining();
        if remaining.is_zero() {
            return expired_reply(call);
        }
        let body = json!({
            "messages": [{"role": "user", "content": call.prompt}],
            "temperature": call.temperature,
        });

        let response = self
            .client
            .post(&call.descriptor.endpoint_url)
            .query(&[("access_token", token.as_str())])
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
            Ok(value) => match parse_chat_response(&value) {
                Ok(parsed) => success_reply(call, parsed, started),
                Err(message) => parse_failure(call, started, message),
            },
            Err(err) => parse_failure(call, started, format!("invalid JSON payload: {err}")),
        }
    }
}

/// Extract the `result` field. ERNIE signals its own errors with a 200 body
/// carrying `error_code`, which counts as a parse failure here.
fn parse_chat_response(value: &serde_json::Value) -> Result<ParsedCompletion, String> {
    if let Some(code) = value.get("error_code").and_then(serde_json::Value::as_u64) {
        let message = value
            .get("error_msg")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        return Err(format!("vendor error {code}: {message}"));
    }

    let text = value
        .get("result")
        .and_then(serde_json::Value::as_str)
        .ok_or("missing result field")?;

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
    fn secret_ref_derivation() {
        assert_eq!(ernie_secret_ref("ERNIE_API_KEY"), "ERNIE_SECRET_KEY");
        assert_eq!(ernie_secret_ref("CUSTOM"), "CUSTOM_SECRET");
    }

    #[test]
    fn parses_result_and_usage() {
        let payload = json!({
            "result": "4",
            "usage": {"prompt_tokens": 7, "completion_tokens": 1}
        });
        let parsed = parse_chat_response(&payload).unwrap();
        assert_eq!(parsed.text, "4");
        assert_eq!(parsed.usage, Some((7, 1)));
    }

    #[test]
    fn vendor_error_body_is_rejected() {
        let payload = json!({"error_code": 110, "error_msg": "Access token invalid"});
        let err = parse_chat_response(&payload).unwrap_err();
        assert!(err.contains("110"));
    }

    #[test]
    fn missing_result_is_a_parse_error() {
        let payload = json!({"id": "x"});
        assert!(parse_chat_response(&payload).is_err());
    }
}
