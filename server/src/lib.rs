//! HTTP layer for crossmind
//!
//! Binds the external endpoints to the consensus engine: payload parsing and
//! validation, bearer auth with per-class rate limits, the inflight cap, and
//! translation of engine error kinds into the uniform error envelope. The
//! router never speaks provider vocabulary.

pub mod http;
pub mod state;

pub use http::router::build_router;
pub use state::AppState;
