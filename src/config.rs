//! Configuration for the experience store
//!
//! Read from `experience.toml` (or an explicit path). A missing default file
//! means defaults. Environment variables override the file:
//!
//! - `EXPERIENCE_DB_DIR`: persist directory
//! - `EMBEDDING_MODEL_NAME`: embedding model identifier
//! - `EMBEDDING_MODEL_DIM`: embedding width
//!
//! ```toml
//! persist_dir = "experience_db"
//! base_collection = "experiences"
//!
//! [embeddings]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dimensions = 1536
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::paths;

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "experience.toml";

pub const ENV_PERSIST_DIR: &str = "EXPERIENCE_DB_DIR";
pub const ENV_MODEL_NAME: &str = "EMBEDDING_MODEL_NAME";
pub const ENV_MODEL_DIM: &str = "EMBEDDING_MODEL_DIM";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the registry, database and indices
    pub persist_dir: PathBuf,
    /// Prefix for synthesized collection names
    pub base_collection: String,
    pub embeddings: EmbeddingsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub provider: Provider,
    pub model: String,
    pub dimensions: usize,
    /// Base URL of an OpenAI-compatible API
    pub api_base: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Offline feature hashing
    #[default]
    Hashing,
    /// OpenAI-compatible HTTP API
    OpenAi,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(paths::DEFAULT_PERSIST_DIR),
            base_collection: "experiences".to_string(),
            embeddings: EmbeddingsConfig::default(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: "unknown-model".to_string(),
            dimensions: 1536,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load from `path` (or `experience.toml`) and apply environment overrides
    ///
    /// Only the default file may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(explicit) = path {
            if !explicit.exists() {
                bail!("Config file not found: {}", explicit.display());
            }
        }
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup` (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_PERSIST_DIR).filter(|v| !v.is_empty()) {
            self.persist_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup(ENV_MODEL_NAME).filter(|v| !v.is_empty()) {
            self.embeddings.model = model;
        }
        if let Some(dim) = lookup(ENV_MODEL_DIM).filter(|v| !v.is_empty()) {
            self.embeddings.dimensions = dim
                .trim()
                .parse()
                .with_context(|| format!("{} is not a valid dimension: {}", ENV_MODEL_DIM, dim))?;
        }
        Ok(())
    }
}
