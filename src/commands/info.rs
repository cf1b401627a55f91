//! Info command - Open the store and describe the active collection

use anyhow::Result;
use experience_db::collection::CollectionStore;
use experience_db::{Config, ExperienceStore};

pub fn execute(config: &Config) -> Result<()> {
    let store = ExperienceStore::from_config(config)?;

    println!("📁 Persist dir:  {}", store.persist_dir().display());
    println!("🧠 Model:        {} ({} dims)", store.model_name(), store.dimension());
    println!("📚 Collection:   {}", store.collection_name());
    println!("📝 Documents:    {} (including init marker)", store.count()?);

    let catalog = CollectionStore::open(store.persist_dir())?;
    let collections = catalog.collections()?;

    println!("\nAll collections:");
    println!("{:<50} {:<28} {:>6}", "NAME", "MODEL", "DIMS");
    println!("{}", "─".repeat(86));
    for (name, header) in collections {
        match header {
            Some(h) => println!("{:<50} {:<28} {:>6}", name, h.model, h.dimension),
            None => println!("{:<50} {:<28} {:>6}", name, "(no header)", "-"),
        }
    }

    Ok(())
}
