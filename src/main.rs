//! # Quarry CLI (`quarry`)
//!
//! The `quarry` binary drives corpus builds, searches, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! quarry --config ./config/quarry.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quarry init` | Create the SQLite database and run schema migrations |
//! | `quarry build` | Extract, enrich, and index the source corpus |
//! | `quarry search "<query>"` | Run a search pipeline and print the result |
//! | `quarry describe` | Print store summary counts |
//! | `quarry serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use quarry::pipeline::{pipeline_factory, prepare_response, PipelineKind, SearchPipeline};
use quarry::store::DocumentStore;
use quarry::{build, config, db, server, store};

/// Quarry — a document search and summarization service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/quarry.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Quarry — a document search and summarization service",
    version,
    long_about = "Quarry extracts sentence fragments from HTML, DOCX, and PDF corpora, \
    groups them into context windows, indexes them in SQLite, and answers queries through \
    retrieval pipelines that summarize or extract answers from the surrounding context."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/quarry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent.
    Init,

    /// Build the corpus: extract fragments, write context artifacts, and
    /// load the store.
    ///
    /// The store and artifacts are rebuilt wholesale each run.
    Build {
        /// Index name used for the artifact files.
        #[arg(long)]
        name: Option<String>,
    },

    /// Run a search pipeline and print the JSON result.
    Search {
        /// The search query string.
        query: String,

        /// Pipeline: `summarization` or `qa`.
        #[arg(long, default_value = "summarization")]
        pipeline: String,

        /// Number of documents to retrieve before ranking.
        #[arg(long)]
        retrieve: Option<usize>,

        /// Number of documents to keep after ranking.
        #[arg(long)]
        rank: Option<usize>,
    },

    /// Print store summary counts.
    Describe,

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.store.path).await?;
            db::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Build { name } => {
            let index_name = name.unwrap_or_else(|| cfg.pipeline.index.clone());
            let report = build::run_build(&cfg, &index_name).await?;
            build::print_report(&report, &index_name);
        }
        Commands::Search {
            query,
            pipeline,
            retrieve,
            rank,
        } => {
            let kind: PipelineKind = pipeline.parse()?;
            let store = store::open_store(&cfg.store).await?;
            let pipeline = pipeline_factory(kind, &cfg, Arc::clone(&store))?;
            let output = pipeline
                .run(
                    &query,
                    retrieve.unwrap_or(cfg.pipeline.top_k_retrieve),
                    rank.unwrap_or(cfg.pipeline.top_k_rank),
                )
                .await?;
            let response = prepare_response(&query, &output);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Describe => {
            let store = store::open_store(&cfg.store).await?;
            let stats = store.describe().await?;
            println!("documents: {}", stats.documents);
            println!("files:     {}", stats.files);
            println!("embedded:  {}", stats.embedded);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
