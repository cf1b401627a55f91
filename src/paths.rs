//! Single source of truth for the experience store's filesystem layout.
//!
//! This module defines WHERE data lives. It has no I/O, no validation,
//! no business logic. One file shows the entire layout.
//!
//! ```text
//! <persist_dir>/
//! ├── registry.json            # (model, dim) -> collection name
//! ├── collections.db           # SQLite catalog + documents
//! └── indexes/                 # Derived (rebuildable from collections.db)
//!     └── <collection>.usearch # HNSW index per collection
//! ```

use std::path::{Path, PathBuf};

/// Default persist directory, relative to the working directory
pub const DEFAULT_PERSIST_DIR: &str = "experience_db";

/// Collection registry: `<persist_dir>/registry.json`
pub fn registry_path(persist_dir: &Path) -> PathBuf {
    persist_dir.join("registry.json")
}

/// SQLite database holding collections and documents: `<persist_dir>/collections.db`
pub fn database_path(persist_dir: &Path) -> PathBuf {
    persist_dir.join("collections.db")
}

/// Directory of vector indices: `<persist_dir>/indexes/`
pub fn indexes_dir(persist_dir: &Path) -> PathBuf {
    persist_dir.join("indexes")
}

/// Vector index for one collection: `<persist_dir>/indexes/<name>.usearch`
pub fn index_path(persist_dir: &Path, collection: &str) -> PathBuf {
    indexes_dir(persist_dir).join(format!("{}.usearch", collection))
}
