//! Query command - Fetch the best accepted past transcript

use anyhow::Result;
use experience_db::{Config, ExperienceStore};

pub fn execute(config: &Config, text: &str, k: usize) -> Result<()> {
    let mut store = ExperienceStore::from_config(config)?;

    let snippet = store.query_experience(text, k);
    if snippet.is_empty() {
        eprintln!("No matching experience.");
    } else {
        println!("{}", snippet);
    }

    Ok(())
}
