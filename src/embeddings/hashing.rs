//! Feature-hashing embedder
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dimension` buckets with a ±1 sign, and the result is L2 normalized.
//! Texts sharing vocabulary land close together under cosine similarity.
//! Output is stable across processes and platforms, so it is usable offline
//! and in tests.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

use super::{normalize, EmbeddingEngine};

pub struct HashingEmbedder {
    model_name: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(model_name: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            bail!("Embedding dimension must be positive");
        }

        Ok(Self {
            model_name: model_name.to_string(),
            dimension,
        })
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);

        let bucket = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

impl EmbeddingEngine for HashingEmbedder {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimension];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let (bucket, sign) = self.bucket(&token);
            embedding[bucket] += sign;
        }

        // Cosine is undefined for the zero vector (empty text, cancelled signs)
        if embedding.iter().all(|x| *x == 0.0) {
            embedding[0] = 1.0;
        }

        normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedder::new("m", 0).is_err());
    }

    #[test]
    fn test_embedding_is_normalized() -> Result<()> {
        let mut embedder = HashingEmbedder::new("m", 64)?;
        let embedding = embedder.embed("TypeError: can't multiply sequence")?;
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_empty_text_is_not_zero() -> Result<()> {
        let mut embedder = HashingEmbedder::new("m", 8)?;
        let embedding = embedder.embed("  ...  ")?;
        assert_relative_eq!(embedding[0], 1.0);
        Ok(())
    }

    #[test]
    fn test_deterministic_and_case_insensitive() -> Result<()> {
        let mut a = HashingEmbedder::new("m", 32)?;
        let mut b = HashingEmbedder::new("m", 32)?;
        assert_eq!(a.embed("Fix the Cart total")?, b.embed("fix the cart TOTAL")?);
        Ok(())
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() -> Result<()> {
        let mut embedder = HashingEmbedder::new("m", 256)?;
        let stored = embedder.embed("calculate_total raised TypeError in utils py")?;
        let related = embedder.embed("TypeError in calculate_total")?;
        let unrelated = embedder.embed("weather forecast for tomorrow morning")?;

        assert!(dot(&stored, &related) > dot(&stored, &unrelated));
        Ok(())
    }
}
