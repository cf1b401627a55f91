//! List command - Show the collection registry without opening any collection

use anyhow::Result;
use experience_db::experience::format_record;
use experience_db::{resolver, Config, Registry};

/// Print one line per registered collection, marking the active one
pub fn execute(config: &Config) -> Result<()> {
    let registry = Registry::load(&config.persist_dir);

    if registry.is_empty() {
        println!("No collections registered in {}", config.persist_dir.display());
        return Ok(());
    }

    let active = resolver::resolve(
        &config.embeddings.model,
        config.embeddings.dimensions,
        &config.base_collection,
        &registry,
    );

    for record in registry.records() {
        let marker = if record.name == active { "*" } else { " " };
        println!("{} {}", marker, format_record(record));
    }

    Ok(())
}
