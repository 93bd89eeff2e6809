//! # docqa CLI
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ingest [PATHS...]` | Extract files and rebuild the index |
//! | `docqa ask "<question>"` | Answer one question from the indexed documents |
//! | `docqa chat` | Interactive question session with history |
//! | `docqa summarize` | Summarize the main theme of the indexed documents |
//! | `docqa status` | Index location, size, model and chunk counts |
//! | `docqa inspect` | Print the first stored chunks |
//! | `docqa serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::progress::ProgressMode;
use docqa::{ask, config, ingest, logging, server, stats};

/// docqa: ask questions about your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Ask questions about local PDFs, scans and notes",
    version,
    long_about = "docqa extracts text from PDFs, images (OCR) and text files, indexes it \
    as embedded chunks in a local SQLite file, and answers questions with a generation \
    model grounded in the retrieved passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    /// Debug-level diagnostics on stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, chunk and embed documents, then replace the index.
    ///
    /// With no paths, scans `ingest.input_dir`. The new index becomes visible
    /// only once it is completely written; a failed ingest leaves the
    /// previous index in place.
    Ingest {
        /// Files or directories to ingest.
        paths: Vec<PathBuf>,

        /// Rebuild even when `index.force_rebuild = false`.
        #[arg(long)]
        force: bool,

        /// Show file and chunk counts without embedding or writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr: `human`, `json` or `off` (default: human on a TTY).
        #[arg(long)]
        progress: Option<String>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        question: String,

        /// Number of chunks to retrieve (default: `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Also print the retrieved passages.
        #[arg(long)]
        show_context: bool,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive session: `:history`, `:clear`, `:quit`.
    Chat,

    /// Summarize the main theme of the indexed documents.
    Summarize,

    /// Show what is indexed and which models are configured.
    Status {
        /// Probe the generation model with a trivial prompt.
        #[arg(long)]
        check: bool,
    },

    /// Print the entry count and the first stored chunks.
    Inspect {
        #[arg(long, default_value_t = 3)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn progress_mode(flag: Option<&str>) -> anyhow::Result<ProgressMode> {
    match flag {
        None => Ok(ProgressMode::default_for_tty()),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some("off") => Ok(ProgressMode::Off),
        Some(other) => anyhow::bail!("Unknown progress mode: '{}'. Use human, json or off.", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            paths,
            force,
            dry_run,
            progress,
        } => {
            let mode = progress_mode(progress.as_deref())?;
            ingest::run_ingest(&cfg, &paths, dry_run, force, mode).await?;
        }
        Commands::Ask {
            question,
            k,
            show_context,
            json,
        } => {
            ask::run_ask(&cfg, &question, k, show_context, json).await?;
        }
        Commands::Chat => {
            ask::run_chat(&cfg).await?;
        }
        Commands::Summarize => {
            ask::run_summarize(&cfg).await?;
        }
        Commands::Status { check } => {
            stats::run_status(&cfg, check).await?;
        }
        Commands::Inspect { limit, json } => {
            stats::run_inspect(&cfg, limit, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
