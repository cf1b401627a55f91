use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use experience_db::Config;

mod commands;

/// Log filter variable, e.g. `EXPERIENCE_LOG=experience_db=debug`
const ENV_LOG: &str = "EXPERIENCE_LOG";

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Inspect and feed the experience store", long_about = None)]
struct Cli {
    /// Config file (defaults to ./experience.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the persist directory
    #[arg(long, global = true)]
    persist_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered collections
    List,

    /// Show the active collection for the configured embedding model
    Info,

    /// Fetch the best accepted past transcript for a query
    Query {
        /// Query text
        text: String,

        /// Number of matches to consider
        #[arg(short, long, default_value_t = experience_db::experience::DEFAULT_TOP_K)]
        k: usize,
    },

    /// Record a transcript with its feedback
    Add {
        /// Transcript text
        text: String,

        /// Whether the interaction was correct (y/n)
        #[arg(short, long)]
        feedback: String,

        /// Query that produced the transcript
        #[arg(short, long, default_value = "")]
        query: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.persist_dir {
        config.persist_dir = dir;
    }

    match cli.command {
        Commands::List => commands::list::execute(&config)?,
        Commands::Info => commands::info::execute(&config)?,
        Commands::Query { text, k } => commands::query::execute(&config, &text, k)?,
        Commands::Add {
            text,
            feedback,
            query,
        } => commands::add::execute(&config, &text, &feedback, &query)?,
    }

    Ok(())
}
