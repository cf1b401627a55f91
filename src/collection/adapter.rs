//! Open-or-create with self-healing
//!
//! Given the resolved collection name, produce a usable handle whose header
//! matches the active embedding engine:
//!
//! | lookup            | registered name          | unregistered name        |
//! |-------------------|--------------------------|--------------------------|
//! | `Found`           | reuse                    | reuse (registry was lost)|
//! | `Unstamped`       | stamp in place, reuse    | stamp in place, reuse    |
//! | `SchemaMismatch`  | fork to `_new`           | fork to `_new`           |
//! | `ModelMismatch`   | fork to `_new`           | fork to `_new`           |
//! | `Broken`          | fork to `_new`           | fork to `_new`           |
//! | `NotFound`        | fork to `_new`           | create fresh             |
//!
//! A collection is never written with vectors of another width or another
//! model: drift always forks and leaves the old collection untouched. Model
//! names that sanitize to the same collection name end up here as
//! `ModelMismatch`.

use anyhow::{bail, Result};
use tracing::{debug, info};

use super::{
    Collection, CollectionHeader, CollectionStore, Lookup, Metadata, SENTINEL_KEY, SENTINEL_TEXT,
};
use crate::embeddings::EmbeddingEngine;
use crate::registry::Registry;
use crate::resolver;

/// Upper bound on `_new`, `_new_2`, ... candidates tried by a fork
const MAX_REPAIR_ATTEMPTS: usize = 32;

/// Open `name` for the active engine, repairing or forking as needed
///
/// The returned handle's name may differ from `name` when a fork happened.
/// Registry records made stale by a repair are corrected here; registering
/// the returned name is left to the caller.
pub fn open_or_create(
    store: &CollectionStore,
    registry: &mut Registry,
    name: &str,
    base_name: &str,
    engine: &mut dyn EmbeddingEngine,
) -> Result<Collection> {
    let header = CollectionHeader::new(engine.model_name(), engine.dimension());
    let known = registry.contains(name);

    match store.lookup(name, &header)? {
        Lookup::Found(collection) => {
            debug!(collection = name, "reusing collection");
            Ok(collection)
        }
        Lookup::Unstamped(collection) => {
            info!(collection = name, "collection has no header, stamping in place");
            stamp(store, collection, &header)
        }
        Lookup::SchemaMismatch { stored_dim } => {
            info!(
                collection = name,
                stored_dim,
                active_dim = header.dimension,
                "dimension drift, forking to a new collection"
            );
            if let Some(model) = registry.get(name).map(|r| r.model.clone()) {
                registry.retag(name, &model, stored_dim)?;
            }
            fork(store, base_name, &header, engine)
        }
        Lookup::ModelMismatch { stored_model } => {
            info!(
                collection = name,
                %stored_model,
                active_model = %header.model,
                "collection belongs to another model, forking to a new collection"
            );
            if known {
                registry.retag(name, &stored_model, header.dimension)?;
            }
            fork(store, base_name, &header, engine)
        }
        Lookup::Broken { reason } => {
            info!(collection = name, %reason, "collection unusable, forking to a new collection");
            fork(store, base_name, &header, engine)
        }
        Lookup::NotFound if known => {
            info!(collection = name, "registered collection is missing, forking to a new collection");
            registry.remove(name)?;
            fork(store, base_name, &header, engine)
        }
        Lookup::NotFound => create_fresh(store, name, &header, engine),
    }
}

/// Create the first usable `_new` collection for `header`
///
/// A candidate already carrying a matching header is an earlier fork and is
/// reused as is.
fn fork(
    store: &CollectionStore,
    base_name: &str,
    header: &CollectionHeader,
    engine: &mut dyn EmbeddingEngine,
) -> Result<Collection> {
    let first = resolver::repair_name(base_name, &header.model, header.dimension);

    for attempt in 1..=MAX_REPAIR_ATTEMPTS {
        let candidate = if attempt == 1 {
            first.clone()
        } else {
            format!("{}_{}", first, attempt)
        };

        match store.lookup(&candidate, header)? {
            Lookup::NotFound => return create_fresh(store, &candidate, header, engine),
            Lookup::Found(collection) => {
                debug!(collection = %candidate, "reusing earlier repair collection");
                return Ok(collection);
            }
            Lookup::Unstamped(collection) => return stamp(store, collection, header),
            Lookup::SchemaMismatch { .. }
            | Lookup::ModelMismatch { .. }
            | Lookup::Broken { .. } => {
                debug!(collection = %candidate, "repair name taken, trying next");
            }
        }
    }

    bail!(
        "No usable collection name after {} attempts starting at {}",
        MAX_REPAIR_ATTEMPTS,
        first
    )
}

/// New collection holding only the sentinel document, stamped and persisted
///
/// The sentinel is embedded before the catalog row exists, so a failing
/// engine leaves nothing behind.
fn create_fresh(
    store: &CollectionStore,
    name: &str,
    header: &CollectionHeader,
    engine: &mut dyn EmbeddingEngine,
) -> Result<Collection> {
    let embedding = engine.embed(SENTINEL_TEXT)?;
    if embedding.len() != header.dimension {
        bail!(
            "Model {} returned {} dimensions, expected {}",
            header.model,
            embedding.len(),
            header.dimension
        );
    }

    let mut collection = store.create(name, header.dimension)?;
    let mut metadata = Metadata::new();
    metadata.insert(SENTINEL_KEY.to_string(), true.into());
    collection.add(SENTINEL_TEXT, &embedding, &metadata)?;

    store.stamp(name, header)?;
    collection.persist()?;

    info!(
        collection = name,
        model = %header.model,
        dimension = header.dimension,
        "created collection"
    );
    Ok(collection)
}

fn stamp(
    store: &CollectionStore,
    collection: Collection,
    header: &CollectionHeader,
) -> Result<Collection> {
    store.stamp(collection.name(), header)?;
    collection.persist()?;
    Ok(collection)
}
