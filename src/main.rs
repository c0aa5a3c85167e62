//! # Cinder Search CLI (`cinder`)
//!
//! The `cinder` binary indexes the configured proteomics files and runs
//! cross-file term searches over them, fusing each match with the related
//! rows of every other file in the same analysis group.
//!
//! ## Usage
//!
//! ```bash
//! cinder --config ./config/cinder.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cinder init` | Create the SQLite database and run schema migrations |
//! | `cinder index` | Load groups, documents, and file contents into the catalog |
//! | `cinder search "<expr>"` | Run a search session and persist its fused records |
//! | `cinder results <id>` | Print the records of a finished session |
//! | `cinder sessions` | List recent sessions |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize and index
//! cinder init --config ./config/cinder.toml
//! cinder index --config ./config/cinder.toml
//!
//! # Search two terms in one group, gene-name matches only
//! cinder search "BRCA1 or TP53" --mode gene --group ko-vs-wt
//!
//! # Machine-readable progress on stderr
//! cinder search "Q9Y6K9" --progress json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cinder_search::progress::ProgressMode;
use cinder_search::search::SearchOptions;
use cinder_search::{catalog, config, logging, migrate, results, search};
use cinder_search_core::models::{FileCategory, SearchMode};

/// Cinder Search: cross-file term search and result fusion for delimited
/// proteomics files.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file that declares the database, search defaults, and document catalog.
#[derive(Parser)]
#[command(
    name = "cinder",
    about = "Cross-file term search and result fusion for delimited proteomics files",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cinder.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Load analysis groups and documents from the config into the catalog.
    ///
    /// File contents are hashed; unchanged files are skipped unless
    /// `--full` is given.
    Index {
        /// Reload every document regardless of its stored hash.
        #[arg(long)]
        full: bool,
    },

    /// Run a search session.
    ///
    /// Alternatives are joined with `or` (`"BRCA1 or TP53"`); hyphenated
    /// terms such as `receptor-binding` are matched whole.
    Search {
        /// Search expression.
        expression: String,

        /// Absolute log2 fold-change cutoff.
        #[arg(long = "fc")]
        fold_change_cutoff: Option<f64>,

        /// -log10 p-value cutoff.
        #[arg(long = "p")]
        p_value_cutoff: Option<f64>,

        /// Match mode: full, gene, uniprot, or primary_id.
        #[arg(long)]
        mode: Option<SearchMode>,

        /// Restrict to analysis groups (repeatable).
        #[arg(long = "group")]
        groups: Vec<String>,

        /// Restrict to groups of one species.
        #[arg(long)]
        species: Option<String>,

        /// Categories searched for anchor matches (repeatable).
        #[arg(long = "category")]
        categories: Vec<FileCategory>,

        /// Channel key progress events are addressed to.
        #[arg(long)]
        channel: Option<String>,

        /// Progress output on stderr: off, human, or json.
        /// Defaults to human when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Print the records of a session.
    Results {
        /// Session ID printed by `cinder search`.
        id: String,

        /// Print the session and records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List recent sessions.
    Sessions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { full } => {
            catalog::run_index(&cfg, full).await?;
        }
        Commands::Search {
            expression,
            fold_change_cutoff,
            p_value_cutoff,
            mode,
            groups,
            species,
            categories,
            channel,
            progress,
        } => {
            let progress = match progress {
                Some(value) => ProgressMode::parse(&value)?,
                None => ProgressMode::default_for_tty(),
            };
            let options = SearchOptions {
                fold_change_cutoff,
                p_value_cutoff,
                mode,
                groups,
                species,
                categories,
                channel,
                progress,
            };
            search::run_search(&cfg, &expression, options).await?;
        }
        Commands::Results { id, json } => {
            results::run_results(&cfg, &id, json).await?;
        }
        Commands::Sessions => {
            results::run_sessions(&cfg).await?;
        }
    }

    Ok(())
}
