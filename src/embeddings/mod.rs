//! Embeddings module - Generate semantic embeddings for text
//!
//! Provides trait-based abstraction for embedding generation. The experience
//! store only needs three things from an engine: a model identifier and a
//! vector width (together they version the collection) and text → vector.
//!
//! Two engines ship with the crate:
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//! - [`HashingEmbedder`]: deterministic offline feature hashing

mod hashing;
mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

use anyhow::Result;

use crate::config::{EmbeddingsConfig, Provider};

/// Trait for embedding generation engines
pub trait EmbeddingEngine: Send {
    /// Generate embedding for a single text
    fn embed(&mut self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding for a query text
    ///
    /// Asymmetric models may format queries differently from stored
    /// passages. Default implementation calls embed().
    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    /// Embedding width (e.g., 1536 for text-embedding-3-small)
    fn dimension(&self) -> usize;

    /// Model identifier, used with `dimension()` to version collections
    fn model_name(&self) -> &str;
}

/// Create the embedder selected by configuration
pub fn create_embedder(config: &EmbeddingsConfig) -> Result<Box<dyn EmbeddingEngine>> {
    match config.provider {
        Provider::Hashing => Ok(Box::new(HashingEmbedder::new(
            &config.model,
            config.dimensions,
        )?)),
        Provider::OpenAi => Ok(Box::new(OpenAiEmbedder::from_config(config)?)),
    }
}

/// L2 normalize a vector in place; zero vectors are left untouched
pub(crate) fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for x in vec.iter_mut() {
        *x /= norm;
    }
}
