//! # askrepo CLI
//!
//! The `askrepo` binary is the primary interface: commands for database
//! initialization, documentation ingestion, search, one-shot questions,
//! document retrieval, quota stats, and the chat server.
//!
//! ## Usage
//!
//! ```bash
//! askrepo --config ./config/askrepo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askrepo init` | Create the SQLite database and run schema migrations |
//! | `askrepo sync` | Fetch the repository archive, chunk, and index it |
//! | `askrepo search "<query>"` | Keyword search over indexed chunks |
//! | `askrepo ask "<question>"` | One-shot RAG answer with citations |
//! | `askrepo get <id>` | Retrieve a full document by UUID |
//! | `askrepo stats` | Index totals and rate-limit quota usage |
//! | `askrepo serve` | Start the chat server (web UI + JSON API) |

mod agent;
mod ask;
mod chunk;
mod config;
mod db;
mod gemini;
mod get;
mod github;
mod ingest;
mod logs;
mod migrate;
mod models;
mod ratelimit;
mod search;
mod server;
mod stats;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// askrepo, a retrieval-augmented documentation assistant for GitHub
/// repositories.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/askrepo.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "askrepo",
    about = "askrepo — ask questions about a GitHub repository's documentation",
    version,
    long_about = "askrepo ingests the markdown documentation of a GitHub repository, \
    indexes it in SQLite FTS5, and answers questions about it through a Gemini-backed \
    agent with quota-aware rate limiting, via a CLI and an embedded web chat UI."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askrepo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, checkpoints, chunks_fts). Idempotent.
    Init,

    /// Fetch the configured repository's documentation and index it.
    ///
    /// Downloads the branch archive, filters markdown files (English only),
    /// chunks them with the sliding window, and writes documents, chunks,
    /// and FTS rows. Incremental via a checkpoint.
    Sync {
        /// Ingest from a local archive zip instead of downloading.
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Ignore the checkpoint and reingest everything.
        #[arg(long)]
        full: bool,

        /// Show item and chunk counts without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search indexed documentation.
    ///
    /// Keyword (FTS5) search returning ranked, document-grouped results
    /// with snippets and GitHub links.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Ask a one-shot question and print the answer with citations.
    ///
    /// Retrieves the top matching chunks, asks Gemini, and prints the
    /// grounded answer. Subject to the configured rate limits; requires
    /// `GOOGLE_API_KEY`.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Retrieve a document by its UUID.
    ///
    /// Prints the document's metadata, full body text, and all chunks.
    Get {
        /// Document UUID.
        id: String,
    },

    /// Show index totals and rate-limit quota usage.
    Stats,

    /// Start the chat server.
    ///
    /// Serves the embedded web chat UI and the JSON API on the address
    /// configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so RUST_LOG and GOOGLE_API_KEY can live there
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            archive,
            full,
            dry_run,
            limit,
        } => {
            ingest::run_sync(&cfg, archive.as_deref(), full, dry_run, limit).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask { question } => {
            ask::run_ask(&cfg, &question).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
