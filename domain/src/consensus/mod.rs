//! Consensus value objects and algorithms: provider calls and replies, the
//! assembled result, agreement scoring, and request fingerprints.

pub mod fingerprint;
pub mod reply;
pub mod result;
pub mod scoring;
