//! archindex: finding-aid import and search indexing
//!
//! Command-line entry point for full reimports, single-document imports, run
//! management and index queries.

mod commands;

use anyhow::{Context, Result};
use archindex::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "archindex")]
#[command(about = "Import archival finding aids into a search index")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "archindex.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Start a full reimport into fresh shadow indexes
    Run {
        /// Directory of finding aids (overrides import.data_dir)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Quiet mode (no progress output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Resume a failed or interrupted run from its checkpoint
    Resume {
        /// Run id
        id: i64,

        /// Directory of finding aids (overrides import.data_dir)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Quiet mode (no progress output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Import one finding aid directly into the live indexes
    ImportFile {
        /// Path to the XML document
        path: PathBuf,
    },

    /// Show import runs
    Status {
        /// Run id (latest runs when omitted)
        id: Option<i64>,

        /// Number of runs to list
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Ask a run to stop at the next document boundary
    Cancel {
        /// Run id
        id: i64,
    },

    /// Search the live indexes
    Search {
        /// Search query
        query: String,

        /// Which index to search
        #[arg(short, long, value_enum, default_value = "file")]
        entity: CliEntity,

        /// Filter expression, e.g. "decade = 1960"
        #[arg(long)]
        filter: Option<String>,

        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Results per page
        #[arg(long, default_value = "20")]
        per_page: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the trigram match expression for a query
    Sanitize {
        /// Free-text query
        query: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CliEntity {
    File,
    Node,
    Origin,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)
            .with_context(|| format!("Loading {}", cli.config.display()))?
    } else {
        Config::from_env()?
    };

    config.logging.init(cli.verbose)?;

    match cli.command {
        Commands::Init { path } => commands::init::init_config(path),
        Commands::Run { data_dir, quiet } => commands::import::start_run(config, data_dir, quiet),
        Commands::Resume { id, data_dir, quiet } => {
            commands::import::resume_run(config, id, data_dir, quiet)
        }
        Commands::ImportFile { path } => commands::import::import_file(config, path),
        Commands::Status { id, limit, format } => {
            commands::status::show_status(config, id, limit, format)
        }
        Commands::Cancel { id } => commands::status::cancel_run(config, id),
        Commands::Search {
            query,
            entity,
            filter,
            page,
            per_page,
            format,
        } => commands::search::search_index(config, query, entity, filter, page, per_page, format),
        Commands::Sanitize { query } => commands::search::sanitize_query(query),
    }
}
