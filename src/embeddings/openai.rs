//! OpenAI-compatible embeddings over HTTP (blocking)

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::EmbeddingEngine;
use crate::config::EmbeddingsConfig;

/// Embedder calling `POST {api_base}/embeddings`
pub struct OpenAiEmbedder {
    http: HttpClient,
    endpoint: String,
    api_key: String,
    model_name: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// Build from configuration, reading the API key from `api_key_env`
    pub fn from_config(config: &EmbeddingsConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("{} is not set", config.api_key_env))?;

        Self::new(
            &config.api_base,
            &api_key,
            &config.model,
            config.dimensions,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn new(
        api_base: &str,
        api_key: &str,
        model_name: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if dimension == 0 {
            bail!("Embedding dimension must be positive");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model_name,
            input: texts,
            dimensions: self.dimension,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("Failed to send embeddings request to {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("Embeddings request failed ({}): {}", status, body);
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .context("Failed to parse embeddings response")?;

        if parsed.data.len() != texts.len() {
            bail!(
                "Embeddings response has {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            );
        }

        parsed.data.sort_by_key(|d| d.index);
        let embeddings: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            bail!(
                "Model {} returned {} dimensions, expected {}",
                self.model_name,
                bad.len(),
                self.dimension
            );
        }

        Ok(embeddings)
    }
}

impl EmbeddingEngine for OpenAiEmbedder {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow!("Embeddings response was empty"))
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

    #[test]
    fn test_endpoint_trims_trailing_slash() -> Result<()> {
        let embedder = OpenAiEmbedder::new(
            "https://api.example.com/v1/",
            "key",
            "text-embedding-3-small",
            256,
            Duration::from_secs(5),
        )?;
        assert_eq!(embedder.endpoint, "https://api.example.com/v1/embeddings");
        assert_eq!(embedder.dimension(), 256);
        Ok(())
    }

    #[test]
    fn test_request_body_shape() -> Result<()> {
        let input = vec!["a".to_string()];
        let body = serde_json::to_value(EmbeddingRequest {
            model: "m",
            input: &input,
            dimensions: 8,
        })?;
        assert_eq!(body, serde_json::json!({"model": "m", "input": ["a"], "dimensions": 8}));
        Ok(())
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        let config = EmbeddingsConfig {
            api_key_env: "EXPERIENCE_DB_TEST_UNSET_KEY".to_string(),
            ..EmbeddingsConfig::default()
        };
        assert!(OpenAiEmbedder::from_config(&config).is_err());
    }
}
