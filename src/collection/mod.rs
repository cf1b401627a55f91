//! Versioned vector collections - SQLite + USearch hybrid storage
//!
//! - SQLite (`collections.db`) is the source of truth: one catalog row per
//!   collection carrying its metadata header, plus every document with its
//!   raw embedding bytes.
//! - USearch provides similarity search via one HNSW index file per
//!   collection. Index files are derived data and rebuilt from SQLite when
//!   missing or out of sync.
//!
//! A collection's header `{model, dimension}` pins the width of every vector
//! it holds. [`CollectionStore::lookup`] reports what it found as a
//! [`Lookup`] and [`adapter::open_or_create`] decides whether to reuse,
//! stamp, or fork to a fresh collection.

pub mod adapter;
mod handle;
mod store;

pub use adapter::open_or_create;
pub use handle::Collection;
pub use store::CollectionStore;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Text of the placeholder document every fresh collection starts with
pub const SENTINEL_TEXT: &str = "[SYSTEM_INIT]";

/// Metadata key marking the placeholder document
pub const SENTINEL_KEY: &str = "init";

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Document metadata: string keys to scalars
pub type Metadata = BTreeMap<String, MetadataValue>;

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// True if every `filter` entry is present in `metadata` with an equal value
pub fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter.iter().all(|(key, value)| metadata.get(key) == Some(value))
}

/// Schema header stamped on every collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHeader {
    pub model: String,
    pub dimension: usize,
}

impl CollectionHeader {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
        }
    }

    /// Read a header out of a collection's metadata map
    ///
    /// `None` when `dimension` is absent or not a positive integer: such a
    /// collection is treated as never stamped.
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        let dimension = match metadata.get("dimension") {
            Some(MetadataValue::Int(d)) if *d > 0 => *d as usize,
            _ => return None,
        };
        let model = match metadata.get("model") {
            Some(MetadataValue::Text(m)) => m.clone(),
            _ => String::new(),
        };
        Some(Self { model, dimension })
    }

    /// Write this header into `metadata`, keeping unrelated keys
    pub fn stamp_into(&self, metadata: &mut Metadata) {
        metadata.insert("model".to_string(), self.model.clone().into());
        metadata.insert("dimension".to_string(), (self.dimension as i64).into());
    }
}

/// A stored document (embedding not loaded)
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn is_sentinel(&self) -> bool {
        self.metadata.get(SENTINEL_KEY) == Some(&MetadataValue::Bool(true))
    }
}

/// Search hit with cosine similarity
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub similarity: f32,
}

/// Outcome of looking a collection up by name
pub enum Lookup {
    /// Exists with a header matching the requested model and dimension
    Found(Collection),
    /// Exists without a header; its stored vectors (if any) fit the requested dimension
    Unstamped(Collection),
    /// Exists but holds vectors of a different width
    SchemaMismatch { stored_dim: usize },
    /// Exists with the same width but was stamped by another model
    ModelMismatch { stored_model: String },
    /// Exists but could not be opened
    Broken { reason: String },
    NotFound,
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(c) => write!(f, "Found({})", c.name()),
            Self::Unstamped(c) => write!(f, "Unstamped({})", c.name()),
            Self::SchemaMismatch { stored_dim } => {
                write!(f, "SchemaMismatch {{ stored_dim: {} }}", stored_dim)
            }
            Self::ModelMismatch { stored_model } => {
                write!(f, "ModelMismatch {{ stored_model: {} }}", stored_model)
            }
            Self::Broken { reason } => write!(f, "Broken {{ reason: {} }}", reason),
            Self::NotFound => write!(f, "NotFound"),
        }
    }
}

/// Collection names double as index file names
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 200 {
        bail!("Invalid collection name length: {:?}", name);
    }
    if name.starts_with('.') {
        bail!("Collection name must not start with '.': {:?}", name);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        bail!("Invalid character {:?} in collection name {:?}", c, name);
    }
    Ok(())
}
