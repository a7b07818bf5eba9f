//! Embedding port
//!
//! Produces a fixed-length vector for a text, used for semantic similarity in
//! scoring. Implementations must be deterministic: the same text always maps
//! to the same vector.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while embedding a text
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Text embedding service
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text into a fixed-length, L2-normalisable vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Dimensionality of produced vectors.
    fn dimensions(&self) -> usize;
}
