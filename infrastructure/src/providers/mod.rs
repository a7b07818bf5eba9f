//! Per-vendor provider adapters.
//!
//! One adapter exists per wire protocol; the four OpenAI-compatible vendors
//! share a single parameterised adapter. All adapters go through the shared
//! HTTP client, bound their call by the remaining deadline budget, and map
//! every failure into a canonical reply. None of them retry.

pub mod anthropic;
pub mod client;
pub mod cohere;
pub mod ernie;
pub mod google;
pub mod openai_compat;

use crate::config::credentials::CredentialStore;
use crossmind_application::{Provider, ProviderRegistry};
use crossmind_domain::{ErrorKind, ProviderCall, ProviderKind, ProviderReply};
use std::sync::Arc;
use std::time::Instant;

/// Wire every adapter into a registry resolved by provider kind.
pub fn build_provider_registry(
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
) -> ProviderRegistry {
    let openai_compatible = [
        ProviderKind::OpenAiChat,
        ProviderKind::MoonshotChat,
        ProviderKind::ZhipuChat,
        ProviderKind::MistralChat,
    ];

    let mut adapters: Vec<Arc<dyn Provider>> = openai_compatible
        .into_iter()
        .map(|kind| {
            Arc::new(openai_compat::OpenAiCompatAdapter::new(
                kind,
                client.clone(),
                Arc::clone(&credentials),
            )) as Arc<dyn Provider>
        })
        .collect();

    adapters.push(Arc::new(anthropic::AnthropicAdapter::new(
        client.clone(),
        Arc::clone(&credentials),
    )));
    adapters.push(Arc::new(google::GoogleAdapter::new(
        client.clone(),
        Arc::clone(&credentials),
    )));
    adapters.push(Arc::new(cohere::CohereAdapter::new(
        client.clone(),
        Arc::clone(&credentials),
    )));
    adapters.push(Arc::new(ernie::ErnieAdapter::new(client, credentials)));

    ProviderRegistry::new(adapters)
}

/// Text plus optional vendor-reported token usage.
#[derive(Debug)]
pub(crate) struct ParsedCompletion {
    pub text: String,
    pub usage: Option<(u32, u32)>,
}

/// Reply for a call whose budget was already spent on arrival.
pub(crate) fn expired_reply(call: &ProviderCall) -> ProviderReply {
    ProviderReply::failure(
        call.model_id(),
        ErrorKind::ProviderTimeout,
        "no budget left before dispatch",
        std::time::Duration::ZERO,
    )
}

/// Reply for a descriptor whose credential cannot be resolved. Load-time
/// checks disable such models, so hitting this is a wiring bug.
pub(crate) fn missing_credential_reply(call: &ProviderCall, started: Instant) -> ProviderReply {
    ProviderReply::failure(
        call.model_id(),
        ErrorKind::Internal,
        format!("credential {} is not configured", call.descriptor.credential_ref),
        started.elapsed(),
    )
}

/// Map a transport-level reqwest error into a canonical failure reply.
pub(crate) fn transport_failure(
    call: &ProviderCall,
    started: Instant,
    err: reqwest::Error,
) -> ProviderReply {
    if err.is_timeout() {
        ProviderReply::failure(
            call.model_id(),
            ErrorKind::ProviderTimeout,
            "provider call timed out",
            started.elapsed(),
        )
    } else {
        let mut reply = ProviderReply::failure(
            call.model_id(),
            ErrorKind::ProviderHttpError,
            err.to_string(),
            started.elapsed(),
        );
        if let Some(status) = err.status() {
            reply = reply.with_http_status(status.as_u16());
        }
        reply
    }
}

/// Reply for a non-success vendor status.
pub(crate) fn status_failure(
    call: &ProviderCall,
    started: Instant,
    status: u16,
    body_excerpt: String,
) -> ProviderReply {
    ProviderReply::failure(
        call.model_id(),
        ErrorKind::ProviderHttpError,
        format!("provider returned HTTP {status}: {body_excerpt}"),
        started.elapsed(),
    )
    .with_http_status(status)
}

/// Reply for an unparseable vendor payload.
pub(crate) fn parse_failure(
    call: &ProviderCall,
    started: Instant,
    message: impl Into<String>,
) -> ProviderReply {
    ProviderReply::failure(
        call.model_id(),
        ErrorKind::ProviderParseError,
        message,
        started.elapsed(),
    )
}

/// Build the success reply, estimating token counts when the vendor did not
/// report usage.
pub(crate) fn success_reply(
    call: &ProviderCall,
    parsed: ParsedCompletion,
    started: Instant,
) -> ProviderReply {
    let reply = ProviderReply::success(call.model_id(), parsed.text, started.elapsed());
    match parsed.usage {
        Some((prompt_tokens, completion_tokens)) => {
            reply.with_tokens(prompt_tokens, completion_tokens)
        }
        None => reply.with_estimated_tokens(&call.prompt),
    }
}

/// Shorten a body for error details without dumping whole payloads into logs.
pub(crate) fn excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let mut cut = LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &body[..cut])
    }
}
