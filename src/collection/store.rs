//! Collection catalog: which collections exist and what header they carry

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::{validate_name, Collection, CollectionHeader, Lookup, Metadata};
use crate::paths;

/// Vector store backend rooted at a persist directory
///
/// Creates:
/// - `{persist_dir}/collections.db` - SQLite catalog and documents
/// - `{persist_dir}/indexes/` - USearch index per collection
pub struct CollectionStore {
    root: PathBuf,
    db: Connection,
}

impl CollectionStore {
    pub fn open<P: AsRef<Path>>(persist_dir: P) -> Result<Self> {
        let root = persist_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(paths::indexes_dir(&root))
            .with_context(|| format!("Failed to create {}", root.display()))?;

        let db = Connection::open(paths::database_path(&root))
            .context("Failed to open SQLite database")?;

        Self::init_schema(&db)?;

        Ok(Self { root, db })
    }

    /// Initialize SQLite schema
    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                metadata TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS documents (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                collection TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);",
        )?;

        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look `name` up and classify it against the active engine's header
    ///
    /// Only storage failures are errors; a collection that exists but cannot
    /// be opened is reported as [`Lookup::Broken`]. A stamped header without
    /// a model name is treated as unstamped.
    pub fn lookup(&self, name: &str, active: &CollectionHeader) -> Result<Lookup> {
        if validate_name(name).is_err() {
            return Ok(Lookup::NotFound);
        }

        let Some(metadata) = self.metadata(name)? else {
            return Ok(Lookup::NotFound);
        };

        let stamped = match metadata.as_ref().and_then(CollectionHeader::from_metadata) {
            Some(header) if header.dimension != active.dimension => {
                return Ok(Lookup::SchemaMismatch {
                    stored_dim: header.dimension,
                });
            }
            Some(header) if header.model.is_empty() => false,
            Some(header) if header.model != active.model => {
                return Ok(Lookup::ModelMismatch {
                    stored_model: header.model,
                });
            }
            Some(_) => true,
            None => match self.stored_width(name)? {
                Some(width) if width != active.dimension => {
                    return Ok(Lookup::SchemaMismatch { stored_dim: width });
                }
                _ => false,
            },
        };

        match Collection::open(&self.root, name, active.dimension) {
            Ok(collection) if stamped => Ok(Lookup::Found(collection)),
            Ok(collection) => Ok(Lookup::Unstamped(collection)),
            Err(e) => Ok(Lookup::Broken {
                reason: format!("{:#}", e),
            }),
        }
    }

    /// Register an empty, unstamped collection and open it
    pub fn create(&self, name: &str, dimension: usize) -> Result<Collection> {
        validate_name(name)?;

        self.db
            .execute(
                "INSERT INTO collections (name, metadata, created_at) VALUES (?1, NULL, ?2)",
                params![name, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("Failed to create collection {}", name))?;

        Collection::open(&self.root, name, dimension)
    }

    /// Write `header` into the collection's metadata, keeping other keys
    pub fn stamp(&self, name: &str, header: &CollectionHeader) -> Result<()> {
        let mut metadata = self.metadata(name)?.flatten().unwrap_or_default();
        header.stamp_into(&mut metadata);

        self.db
            .execute(
                "UPDATE collections SET metadata = ?1 WHERE name = ?2",
                params![serde_json::to_string(&metadata)?, name],
            )
            .with_context(|| format!("Failed to stamp collection {}", name))?;
        Ok(())
    }

    /// Header of `name`, if it exists and is stamped
    pub fn header(&self, name: &str) -> Result<Option<CollectionHeader>> {
        Ok(self
            .metadata(name)?
            .flatten()
            .as_ref()
            .and_then(CollectionHeader::from_metadata))
    }

    /// Number of documents stored in `name`, without opening it
    pub fn document_count(&self, name: &str) -> Result<usize> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All collection names with their headers, oldest first
    pub fn collections(&self) -> Result<Vec<(String, Option<CollectionHeader>)>> {
        let mut stmt = self
            .db
            .prepare("SELECT name, metadata FROM collections ORDER BY created_at, name")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(name, metadata)| {
                let header = metadata
                    .and_then(|json| serde_json::from_str::<Metadata>(&json).ok())
                    .as_ref()
                    .and_then(CollectionHeader::from_metadata);
                (name, header)
            })
            .collect())
    }

    /// `None` if the collection does not exist, `Some(None)` if it has no metadata
    fn metadata(&self, name: &str) -> Result<Option<Option<Metadata>>> {
        let row: Option<Option<String>> = self
            .db
            .query_row(
                "SELECT metadata FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        Ok(row.map(|metadata| metadata.and_then(|json| serde_json::from_str(&json).ok())))
    }

    /// Width of the vectors already stored in `name`, if any
    fn stored_width(&self, name: &str) -> Result<Option<usize>> {
        let bytes: Option<i64> = self
            .db
            .query_row(
                "SELECT length(embedding) FROM documents WHERE collection = ?1 LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        Ok(bytes.map(|b| b as usize / std::mem::size_of::<f32>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_missing() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        let active = CollectionHeader::new("m", 8);
        assert!(matches!(store.lookup("nothing", &active)?, Lookup::NotFound));
        assert!(matches!(store.lookup("../bad", &active)?, Lookup::NotFound));
        Ok(())
    }

    #[test]
    fn test_lookup_classifies_headers() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        store.create("c", 8)?;

        let active = CollectionHeader::new("m", 8);
        assert!(matches!(store.lookup("c", &active)?, Lookup::Unstamped(_)));

        store.stamp("c", &active)?;
        assert!(matches!(store.lookup("c", &active)?, Lookup::Found(_)));
        assert!(matches!(
            store.lookup("c", &CollectionHeader::new("m", 16))?,
            Lookup::SchemaMismatch { stored_dim: 8 }
        ));
        Ok(())
    }

    #[test]
    fn test_lookup_rejects_other_model_of_same_width() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        store.create("c", 8)?;
        store.stamp("c", &CollectionHeader::new("text-embed-a", 8))?;

        match store.lookup("c", &CollectionHeader::new("text.embed.a", 8))? {
            Lookup::ModelMismatch { stored_model } => assert_eq!(stored_model, "text-embed-a"),
            other => panic!("unexpected lookup: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_header_without_model_counts_as_unstamped() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        store.create("c", 8)?;
        store.db.execute(
            "UPDATE collections SET metadata = ?1 WHERE name = 'c'",
            params![r#"{"dimension":8}"#],
        )?;

        assert!(matches!(
            store.lookup("c", &CollectionHeader::new("m", 8))?,
            Lookup::Unstamped(_)
        ));
        Ok(())
    }

    #[test]
    fn test_unstamped_with_wider_vectors_is_mismatch() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        let mut legacy = store.create("legacy", 4)?;
        legacy.add("old", &[1.0, 0.0, 0.0, 0.0], &Metadata::new())?;

        assert!(matches!(
            store.lookup("legacy", &CollectionHeader::new("m", 8))?,
            Lookup::SchemaMismatch { stored_dim: 4 }
        ));
        assert!(matches!(
            store.lookup("legacy", &CollectionHeader::new("m", 4))?,
            Lookup::Unstamped(_)
        ));
        Ok(())
    }

    #[test]
    fn test_stamp_keeps_existing_keys() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        store.create("c", 8)?;
        store.db.execute(
            "UPDATE collections SET metadata = ?1 WHERE name = 'c'",
            params![r#"{"owner":"legacy"}"#],
        )?;

        store.stamp("c", &CollectionHeader::new("m", 8))?;

        let metadata = store.metadata("c")?.flatten().unwrap();
        assert!(metadata.contains_key("owner"));
        assert_eq!(store.header("c")?, Some(CollectionHeader::new("m", 8)));
        Ok(())
    }

    #[test]
    fn test_create_twice_fails() -> Result<()> {
        let temp = TempDir::new()?;
        let store = CollectionStore::open(temp.path())?;
        store.create("c", 8)?;
        assert!(store.create("c", 8).is_err());
        assert_eq!(store.collections()?.len(), 1);
        Ok(())
    }
}
