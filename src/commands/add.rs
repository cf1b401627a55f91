//! Add command - Record a transcript with its feedback

use anyhow::Result;
use experience_db::{Config, ExperienceStore, Feedback};

pub fn execute(config: &Config, text: &str, feedback: &str, query: &str) -> Result<()> {
    let feedback: Feedback = feedback.parse()?;
    let mut store = ExperienceStore::from_config(config)?;

    store.record_feedback(text, feedback, query)?;

    println!(
        "✓ Recorded experience (feedback: {}) in {}",
        feedback,
        store.collection_name()
    );
    Ok(())
}
