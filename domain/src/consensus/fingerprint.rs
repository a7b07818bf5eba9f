//! Request fingerprints and text hashes.
//!
//! The fingerprint is the cache key and the analytics correlator: a SHA-256
//! over the canonicalised request tuple. Two requests with the same
//! normalised fields always produce the same fingerprint, and any single
//! field change flips it.

use crate::core::request::ConsensusRequest;
use sha2::{Digest, Sha256};

/// Deterministic fingerprint of a normalised request.
///
/// Canonical form: lower-cased stripped question, sorted model ids, sorted
/// roles, method, temperature rounded to two decimals, and the chain flags.
pub fn request_fingerprint(request: &ConsensusRequest) -> String {
    let mut model_ids = request.selected_model_ids.clone();
    model_ids.sort();
    let mut roles = request.roles.clone();
    roles.sort();

    let canonical = format!(
        "q={}|models={}|roles={}|method={}|temp={:.2}|cot={}|reasoning={}|depth={}",
        request.question.trim().to_lowercase(),
        model_ids.join(","),
        roles.join(","),
        request.method.as_str(),
        request.temperature,
        request.enable_chain_of_thought,
        request.reasoning_method.as_str(),
        request.chain_depth,
    );

    hex_digest(canonical.as_bytes())
}

/// SHA-256 hex digest of a text, used for embedding cache keys.
pub fn text_hash(text: &str) -> String {
    hex_digest(text.as_bytes())
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
