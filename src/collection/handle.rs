//! Open collection handle: document rows in SQLite, vectors in USearch

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};
use uuid::Uuid;
use zerocopy::AsBytes;

use super::{matches_filter, Document, Metadata, ScoredDocument};
use crate::paths;

/// Initial index capacity; grown by doubling when full
const INITIAL_CAPACITY: usize = 1024;

/// Type alias for document row data from SQLite
/// (id, content, metadata, created_at)
type DocumentRow = (String, String, String, String);

/// One collection opened for reading and writing
pub struct Collection {
    name: String,
    dimension: usize,
    db: Connection,
    vectors: Index,
    index_path: PathBuf,
}

impl Collection {
    /// Open the collection `name` whose vectors are `dimension` wide
    ///
    /// The catalog row must already exist. The USearch index is loaded from
    /// `indexes/<name>.usearch`, or rebuilt from SQLite when the file is
    /// missing, unreadable or disagrees with the stored rows.
    pub(crate) fn open(persist_dir: &Path, name: &str, dimension: usize) -> Result<Self> {
        let db = Connection::open(paths::database_path(persist_dir))
            .context("Failed to open SQLite database")?;

        let mut collection = Self {
            name: name.to_string(),
            dimension,
            db,
            vectors: new_index(dimension, INITIAL_CAPACITY)?,
            index_path: paths::index_path(persist_dir, name),
        };
        collection.load_or_rebuild_index()?;

        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Width of every vector in this collection
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert one document into SQLite and the vector index
    pub fn add(&mut self, content: &str, embedding: &[f32], metadata: &Metadata) -> Result<Uuid> {
        self.check_width(embedding)?;

        let id = Uuid::new_v4();
        let metadata_json = serde_json::to_string(metadata)?;

        let rowid: i64 = self.db.query_row(
            "INSERT INTO documents (id, collection, content, embedding, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING rowid",
            params![
                id.to_string(),
                &self.name,
                content,
                embedding.as_bytes(),
                metadata_json,
                Utc::now().to_rfc3339(),
            ],
            |row| row.get(0),
        )?;

        self.ensure_capacity()?;
        self.vectors
            .add(rowid as u64, embedding)
            .context("Failed to add vector to USearch index")?;

        Ok(id)
    }

    /// Top-`limit` documents by cosine similarity whose metadata matches `filter`
    ///
    /// An empty filter matches everything.
    pub fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: &Metadata,
    ) -> Result<Vec<ScoredDocument>> {
        self.check_width(query_embedding)?;

        let size = self.vectors.size();
        if limit == 0 || size == 0 {
            return Ok(Vec::new());
        }

        let eligible = self.eligible_rowids(filter)?;
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        // Oversample to survive filtering; fall back to the whole index
        let limit = limit.min(size);
        let mut window = limit.saturating_mul(3).min(size);
        let hits = loop {
            let matches = self
                .vectors
                .search(query_embedding, window)
                .context("Failed to search USearch index")?;

            let hits: Vec<(i64, f32)> = matches
                .keys
                .iter()
                .zip(matches.distances.iter())
                .map(|(key, distance)| (*key as i64, *distance))
                .filter(|(rowid, _)| eligible.contains(rowid))
                .take(limit)
                .collect();

            if hits.len() >= limit || window >= size {
                break hits;
            }
            window = size;
        };

        let mut results = Vec::with_capacity(hits.len());
        for (rowid, distance) in hits {
            if let Some(document) = self.load_by_rowid(rowid)? {
                // Cosine distance to similarity
                results.push(ScoredDocument {
                    document,
                    similarity: 1.0 - distance,
                });
            }
        }

        Ok(results)
    }

    /// Number of documents, sentinel included
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![&self.name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All documents in insertion order
    pub fn documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self.db.prepare(
            "SELECT id, content, metadata, created_at FROM documents
             WHERE collection = ?1 ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map(params![&self.name], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<DocumentRow>, _>>()?;

        rows.into_iter().map(document_from_row).collect()
    }

    /// Flush the vector index to disk
    ///
    /// SQLite rows are durable as soon as each statement completes.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.vectors
            .save(self.index_path_str()?)
            .context("Failed to save USearch index")?;
        Ok(())
    }

    fn check_width(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            bail!(
                "Embedding dimension mismatch for collection {}: expected {}, got {}",
                self.name,
                self.dimension,
                embedding.len()
            );
        }
        Ok(())
    }

    fn ensure_capacity(&mut self) -> Result<()> {
        let capacity = self.vectors.capacity();
        if self.vectors.size() >= capacity {
            self.vectors
                .reserve((capacity * 2).max(INITIAL_CAPACITY))
                .context("Failed to grow USearch index")?;
        }
        Ok(())
    }

    fn eligible_rowids(&self, filter: &Metadata) -> Result<HashSet<i64>> {
        let mut stmt = self
            .db
            .prepare("SELECT rowid, metadata FROM documents WHERE collection = ?1")?;

        let rows = stmt
            .query_map(params![&self.name], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut eligible = HashSet::new();
        for (rowid, metadata_json) in rows {
            let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
            if matches_filter(&metadata, filter) {
                eligible.insert(rowid);
            }
        }
        Ok(eligible)
    }

    fn load_by_rowid(&self, rowid: i64) -> Result<Option<Document>> {
        let result = self.db.query_row(
            "SELECT id, content, metadata, created_at FROM documents
             WHERE rowid = ?1 AND collection = ?2",
            params![rowid, &self.name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        );

        match result {
            Ok(row) => Ok(Some(document_from_row(row)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn load_or_rebuild_index(&mut self) -> Result<()> {
        let rows = self.count()?;

        if self.index_path.exists() {
            match self.vectors.load(self.index_path_str()?) {
                Ok(()) if self.vectors.size() == rows && self.vectors.dimensions() == self.dimension => {
                    debug!(collection = %self.name, vectors = rows, "loaded vector index");
                    return Ok(());
                }
                Ok(()) => info!(
                    collection = %self.name,
                    indexed = self.vectors.size(),
                    stored = rows,
                    "vector index out of sync, rebuilding"
                ),
                Err(e) => info!(collection = %self.name, error = %e, "vector index unreadable, rebuilding"),
            }
        }

        self.rebuild_index()
    }

    /// Re-add every stored embedding to a fresh index and save it
    fn rebuild_index(&mut self) -> Result<()> {
        let mut stmt = self
            .db
            .prepare("SELECT rowid, embedding FROM documents WHERE collection = ?1")?;

        let rows = stmt
            .query_map(params![&self.name], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let vectors = new_index(self.dimension, rows.len().max(INITIAL_CAPACITY))?;
        for (rowid, bytes) in &rows {
            let embedding = embedding_from_bytes(bytes);
            if embedding.len() != self.dimension {
                bail!(
                    "Stored embedding {} in {} has {} dimensions, expected {}",
                    rowid,
                    self.name,
                    embedding.len(),
                    self.dimension
                );
            }
            vectors
                .add(*rowid as u64, &embedding)
                .context("Failed to add vector to USearch index")?;
        }

        self.vectors = vectors;
        if !rows.is_empty() {
            self.persist()?;
        }
        Ok(())
    }

    fn index_path_str(&self) -> Result<&str> {
        self.index_path
            .to_str()
            .ok_or_else(|| anyhow!("Index path is not UTF-8: {}", self.index_path.display()))
    }
}

fn new_index(dimension: usize, capacity: usize) -> Result<Index> {
    let options = IndexOptions {
        dimensions: dimension,
        metric: MetricKind::Cos, // Cosine similarity
        quantization: ScalarKind::F32,
        ..Default::default()
    };

    let index = Index::new(&options).context("Failed to create USearch index")?;
    index.reserve(capacity)?;
    Ok(index)
}

/// Decode raw f32 bytes written by `AsBytes`
fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(chunk);
            f32::from_ne_bytes(buf)
        })
        .collect()
}

fn document_from_row((id, content, metadata, created_at): DocumentRow) -> Result<Document> {
    Ok(Document {
        id: Uuid::parse_str(&id).with_context(|| format!("Invalid document id: {}", id))?,
        content,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionStore, MetadataValue};
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    fn feedback(value: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("feedback".to_string(), value.into());
        metadata
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let embedding = vec![0.25f32, -1.5, 3.0];
        assert_eq!(embedding_from_bytes(embedding.as_bytes()), embedding);
    }

    #[test]
    fn test_add_and_search() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        let mut collection = store.create("docs", 4)?;

        collection.add("first", &unit(4, 0), &feedback("y"))?;
        collection.add("second", &unit(4, 1), &feedback("y"))?;
        assert_eq!(collection.count()?, 2);

        let results = collection.search(&unit(4, 1), 1, &Metadata::new())?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.content, "second");
        assert_relative_eq!(results[0].similarity, 1.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_search_respects_filter() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        let mut collection = store.create("docs", 4)?;

        collection.add("rejected fix", &unit(4, 0), &feedback("n"))?;
        collection.add("accepted fix", &unit(4, 2), &feedback("y"))?;

        // Closest vector is the rejected one; the filter must skip it
        let results = collection.search(&unit(4, 0), 1, &feedback("y"))?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.content, "accepted fix");
        assert_eq!(
            results[0].document.metadata.get("feedback"),
            Some(&MetadataValue::from("y"))
        );

        let mut none = Metadata::new();
        none.insert("feedback".to_string(), "maybe".into());
        assert!(collection.search(&unit(4, 0), 1, &none)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_search_with_huge_limit_returns_everything() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        let mut collection = store.create("docs", 4)?;
        collection.add("first", &unit(4, 0), &feedback("y"))?;
        collection.add("second", &unit(4, 1), &feedback("n"))?;

        let results = collection.search(&unit(4, 0), usize::MAX, &Metadata::new())?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.content, "first");

        let accepted = collection.search(&unit(4, 1), usize::MAX, &feedback("y"))?;
        assert_eq!(accepted.len(), 1);
        Ok(())
    }

    #[test]
    fn test_wrong_width_rejected() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        let mut collection = store.create("docs", 4)?;
        collection.add("fits", &unit(4, 0), &Metadata::new())?;

        assert!(collection.add("too wide", &unit(8, 0), &Metadata::new()).is_err());
        assert!(collection.search(&unit(3, 0), 1, &Metadata::new()).is_err());
        assert_eq!(collection.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_index_rebuilt_when_missing() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        {
            let mut collection = store.create("docs", 4)?;
            collection.add("kept", &unit(4, 3), &Metadata::new())?;
            collection.persist()?;
        }

        std::fs::remove_file(paths::index_path(temp.path(), "docs"))?;

        let reopened = Collection::open(temp.path(), "docs", 4)?;
        let results = reopened.search(&unit(4, 3), 1, &Metadata::new())?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.content, "kept");
        assert!(paths::index_path(temp.path(), "docs").exists());
        Ok(())
    }

    #[test]
    fn test_documents_in_insertion_order() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        let mut collection = store.create("docs", 4)?;
        collection.add("a", &unit(4, 0), &Metadata::new())?;
        collection.add("b", &unit(4, 1), &Metadata::new())?;

        let contents: Vec<String> = collection
            .documents()?
            .into_iter()
            .map(|d| d.content)
            .collect();
        assert_eq!(contents, vec!["a", "b"]);
        Ok(())
    }
}
