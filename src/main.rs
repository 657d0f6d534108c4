//! # mdsearch CLI
//!
//! ## Usage
//!
//! ```bash
//! mdsearch --config ./config/mdsearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mdsearch init` | Create the vector store and apply the provider's dimension |
//! | `mdsearch index [--force]` | Chunk, embed and store changed documents |
//! | `mdsearch search "<query>"` | Hybrid search over indexed documents |
//! | `mdsearch chunks <path>` | Show the stored chunks of one document |
//! | `mdsearch remove <path>` | Delete a document and its chunks |
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use mdsearch::cancel::CancelToken;
use mdsearch::commands;
use mdsearch::config::{self, DEFAULT_CONFIG_PATH};

/// mdsearch: chunk, embed and search markdown documents.
#[derive(Parser)]
#[command(name = "mdsearch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and record the embedding dimension.
    ///
    /// Idempotent. If the configured model's dimension differs from the one
    /// recorded in the database, all indexed documents are purged.
    Init,

    /// Index every configured document whose content changed.
    Index {
        /// Re-embed documents even when their content hash is unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Search indexed documents.
    Search {
        query: String,

        /// Maximum number of results (defaults to `[search] limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the stored chunks of a document.
    Chunks {
        /// Document path as shown by `search`.
        path: String,
    },

    /// Remove a document and its chunks from the store.
    Remove { path: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Index { force } => commands::run_index(cfg, force, &cancel).await?,
        Commands::Search { query, limit } => {
            commands::run_search(cfg, &query, limit, &cancel).await?
        }
        Commands::Chunks { path } => commands::run_chunks(&cfg, &path).await?,
        Commands::Remove { path } => commands::run_remove(&cfg, &path).await?,
    }

    Ok(())
}
