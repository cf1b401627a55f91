//! Collection registry (persisted to `<persist_dir>/registry.json`)
//!
//! Maps an embedding configuration `(model, dim)` to the name of the
//! collection holding vectors of that shape. On disk it is an ordered JSON
//! list so the file stays readable and diffable; in memory an index keyed by
//! `(model, dim)` is rebuilt on every load and mutation.
//!
//! A missing or corrupt file loads as an empty registry. Every mutation
//! rewrites the whole file before returning.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::paths;

/// One registered collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// Unique collection name
    pub name: String,
    /// Embedding vector width
    pub dim: usize,
    /// Embedding model identifier
    pub model: String,
}

impl RegistryRecord {
    pub fn new(name: impl Into<String>, dim: usize, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dim,
            model: model.into(),
        }
    }
}

/// Ordered registry records plus a `(model, dim)` lookup index
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    records: Vec<RegistryRecord>,
    by_config: HashMap<(String, usize), usize>,
}

impl Registry {
    /// Load the registry for `persist_dir`, degrading to empty on any failure
    pub fn load(persist_dir: &Path) -> Self {
        let path = paths::registry_path(persist_dir);

        let records = match read_records(&path) {
            Ok(records) => records,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "registry unreadable, starting empty");
                Vec::new()
            }
        };

        Self::from_records(path, records)
    }

    /// Build a registry over `records` without touching disk
    pub fn from_records(path: PathBuf, records: Vec<RegistryRecord>) -> Self {
        let mut registry = Self {
            path,
            records,
            by_config: HashMap::new(),
        };
        registry.reindex();
        registry
    }

    /// Overwrite the backing file with the full record list
    ///
    /// Two-space indentation, declaration field order, non-ASCII kept as-is.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(&self.records)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write registry: {}", self.path.display()))?;
        Ok(())
    }

    /// Append `record` unless its name is already registered
    ///
    /// Returns whether the registry changed. Saves immediately on change.
    pub fn register(&mut self, record: RegistryRecord) -> Result<bool> {
        if self.contains(&record.name) {
            return Ok(false);
        }

        self.records.push(record);
        self.reindex();
        self.save()?;
        Ok(true)
    }

    /// Record owning `(model, dim)`, if any
    pub fn find(&self, model: &str, dim: usize) -> Option<&RegistryRecord> {
        self.by_config
            .get(&(model.to_string(), dim))
            .map(|&i| &self.records[i])
    }

    pub fn get(&self, name: &str) -> Option<&RegistryRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Drop the record named `name`. Saves on change.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let before = self.records.len();
        self.records.retain(|r| r.name != name);
        if self.records.len() == before {
            return Ok(false);
        }

        self.reindex();
        self.save()?;
        Ok(true)
    }

    /// Correct the recorded configuration of `name` to `(model, dim)`
    ///
    /// If another record already owns `(model, dim)` the record is removed
    /// instead, keeping at most one record per configuration. Saves on change.
    pub fn retag(&mut self, name: &str, model: &str, dim: usize) -> Result<bool> {
        let Some(pos) = self.records.iter().position(|r| r.name == name) else {
            return Ok(false);
        };
        if self.records[pos].model == model && self.records[pos].dim == dim {
            return Ok(false);
        }

        let owned_elsewhere = self
            .find(model, dim)
            .is_some_and(|owner| owner.name != name);
        if owned_elsewhere {
            self.records.remove(pos);
        } else {
            self.records[pos].model = model.to_string();
            self.records[pos].dim = dim;
        }

        self.reindex();
        self.save()?;
        Ok(true)
    }

    pub fn records(&self) -> &[RegistryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // First record wins for a duplicated (model, dim), same as a linear scan.
    fn reindex(&mut self) {
        self.by_config.clear();
        for (i, record) in self.records.iter().enumerate() {
            self.by_config
                .entry((record.model.clone(), record.dim))
                .or_insert(i);
        }
    }
}

fn read_records(path: &Path) -> Result<Vec<RegistryRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry: {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse registry: {}", path.display()))
}
