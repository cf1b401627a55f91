//! Experience store
//!
//! Records feedback-labeled interaction transcripts and serves the best
//! positively-rated one back as context for a new query.
//!
//! # Example
//!
//! ```no_run
//! use experience_db::embeddings::HashingEmbedder;
//! use experience_db::{ExperienceStore, Feedback};
//!
//! let embedder = HashingEmbedder::new("text-embed-a", 256)?;
//! let mut store = ExperienceStore::open("experience_db", "experiences", Box::new(embedder))?;
//!
//! store.record_feedback("user: fix utils.py\nagent: ...", Feedback::Yes, "TypeError in utils.py")?;
//! let context = store.query_experience("TypeError in utils.py", 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::collection::{self, Collection, CollectionStore, Metadata, ScoredDocument};
use crate::config::Config;
use crate::embeddings::{self, EmbeddingEngine};
use crate::registry::{Registry, RegistryRecord};
use crate::resolver;

/// Matches returned by `query_experience` when the caller has no preference
pub const DEFAULT_TOP_K: usize = 1;

/// Heading placed before a reused transcript
pub const SNIPPET_PREFIX: &str = "Past work log:";

pub const FEEDBACK_KEY: &str = "feedback";
pub const ORIGINAL_QUERY_KEY: &str = "original_query";

/// User verdict on an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Yes,
    No,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Yes => "y",
            Feedback::No => "n",
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feedback {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "y" | "yes" => Ok(Feedback::Yes),
            "n" | "no" => Ok(Feedback::No),
            other => bail!("Feedback must be 'y' or 'n', got {:?}", other),
        }
    }
}

/// Metadata for one recorded interaction
pub fn experience_metadata(feedback: Feedback, original_query: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(FEEDBACK_KEY.to_string(), feedback.as_str().into());
    metadata.insert(ORIGINAL_QUERY_KEY.to_string(), original_query.into());
    metadata
}

/// Façade over registry, resolver and collection adapter
pub struct ExperienceStore {
    persist_dir: PathBuf,
    registry: Registry,
    collection: Collection,
    embedder: Box<dyn EmbeddingEngine>,
}

impl ExperienceStore {
    /// Open (or initialize) the store under `persist_dir`
    ///
    /// Loads the registry, resolves the collection for the engine's
    /// `(model, dimension)`, opens or repairs it and registers the final name.
    pub fn open<P: AsRef<Path>>(
        persist_dir: P,
        base_collection: &str,
        mut embedder: Box<dyn EmbeddingEngine>,
    ) -> Result<Self> {
        let persist_dir = persist_dir.as_ref().to_path_buf();
        let model = embedder.model_name().to_string();
        let dim = embedder.dimension();

        let store = CollectionStore::open(&persist_dir)?;
        let mut registry = Registry::load(&persist_dir);

        let name = resolver::resolve(&model, dim, base_collection, &registry);
        let collection = collection::open_or_create(
            &store,
            &mut registry,
            &name,
            base_collection,
            embedder.as_mut(),
        )?;

        if registry.register(RegistryRecord::new(collection.name(), dim, &model))? {
            debug!(collection = collection.name(), "registered collection");
        }

        Ok(Self {
            persist_dir,
            registry,
            collection,
            embedder,
        })
    }

    /// Open with the embedder and paths from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = embeddings::create_embedder(&config.embeddings)?;
        Self::open(&config.persist_dir, &config.base_collection, embedder)
    }

    /// Embed `text` and append it to the active collection
    ///
    /// No deduplication; `metadata` is stored as given.
    pub fn add_experience(&mut self, text: &str, metadata: Metadata) -> Result<()> {
        let embedding = self.embedder.embed(text)?;
        self.collection.add(text, &embedding, &metadata)?;
        self.collection.persist()
    }

    /// Store a transcript with its verdict and the query that produced it
    pub fn record_feedback(
        &mut self,
        transcript: &str,
        feedback: Feedback,
        original_query: &str,
    ) -> Result<()> {
        self.add_experience(transcript, experience_metadata(feedback, original_query))
    }

    /// Best positively-rated past transcript for `query`, as a context snippet
    ///
    /// Returns an empty string when nothing qualifies or anything fails.
    pub fn query_experience(&mut self, query: &str, k: usize) -> String {
        match self.try_query(query, k) {
            Ok(Some(snippet)) => snippet,
            Ok(None) => {
                debug!(collection = self.collection.name(), "no matching experience");
                String::new()
            }
            Err(e) => {
                warn!(collection = self.collection.name(), error = %e, "experience query failed");
                String::new()
            }
        }
    }

    fn try_query(&mut self, query: &str, k: usize) -> Result<Option<String>> {
        if self.collection.count()? == 0 {
            return Ok(None);
        }

        let mut filter = Metadata::new();
        filter.insert(FEEDBACK_KEY.to_string(), Feedback::Yes.as_str().into());

        let hits = self.search(query, k, &filter)?;
        Ok(hits
            .into_iter()
            .next()
            .map(|hit| format_snippet(&hit.document.content)))
    }

    /// Scored documents for `query` whose metadata matches `filter`
    pub fn search(
        &mut self,
        query: &str,
        k: usize,
        filter: &Metadata,
    ) -> Result<Vec<ScoredDocument>> {
        let embedding = self.embedder.embed_query(query)?;
        self.collection.search(&embedding, k, filter)
    }

    /// One `name (model) (dim)` line per registered collection
    pub fn list_collections(&self) -> Vec<String> {
        self.registry.records().iter().map(format_record).collect()
    }

    /// Name of the collection receiving adds and queries
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Documents in the active collection, sentinel included
    pub fn count(&self) -> Result<usize> {
        self.collection.count()
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }
}

/// Human-readable registry line
pub fn format_record(record: &RegistryRecord) -> String {
    format!("{} ({}) ({})", record.name, record.model, record.dim)
}

fn format_snippet(content: &str) -> String {
    format!("{}\n{}", SNIPPET_PREFIX, content)
}
