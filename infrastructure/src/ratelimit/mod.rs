//! Token-bucket rate limiting keyed by bearer token and route class.

pub mod bucket;
