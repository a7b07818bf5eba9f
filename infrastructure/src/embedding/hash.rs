//! Deterministic feature-hashing embedder.
//!
//! Tokens (and their adjacent bigrams) are hashed into a fixed number of
//! buckets with a sign bit, then the vector is L2-normalised. The result is
//! stable across calls and processes, cheap enough to run inline, and close
//! enough in behaviour for cosine agreement scoring: identical texts map to
//! identical vectors and unrelated texts to near-orthogonal ones.

use async_trait::async_trait;
use crossmind_application::{EmbedError, Embedder};
use sha2::{Digest, Sha256};

/// Default vector length.
pub const DEFAULT_DIMENSIONS: usize = 384;

pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut eight = [0u8; 8];
        eight.copy_from_slice(&digest[..8]);
        let hash = u64::from_be_bytes(eight);
        let index = (hash % self.dimensions as u64) as usize;
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        for token in &tokens {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            let (index, sign) = self.bucket(&bigram);
            vector[index] += 0.5 * sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
            return vector;
        }

        // No alphanumeric tokens at all: fall back to a one-hot bucket over
        // the raw text so equal inputs still embed equally.
        let (index, _) = self.bucket(text.trim());
        vector[index] = 1.0;
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
