//! Ports: the interfaces the engine depends on.
//!
//! Every collaborator is injected explicitly. Where a dependency is optional
//! at deployment time (cache backend, analytics store) a null implementation
//! stands in, so the engine never branches on "is it configured".

pub mod analytics;
pub mod cache;
pub mod embedder;
pub mod provider;
