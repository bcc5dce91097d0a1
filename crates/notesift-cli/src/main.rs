//! # notesift CLI
//!
//! Command-line interface for the notesift note search engine.
//!
//! ## Commands
//!
//! - `notesift index` - Rebuild the index from the notes database
//! - `notesift query <text>` - Ranked search over notes
//! - `notesift suggest <prefix>` - Tag and term completions
//! - `notesift status` - Show index statistics
//! - `notesift clear` - Delete the snapshot cache
//!
//! ## Example Usage
//!
//! ```bash
//! # Create a database with the starter notes and index it
//! notesift index --sample
//!
//! # Search, keeping only notes tagged "devops"
//! notesift query "docker compose" --tag devops
//!
//! # Complete a prefix
//! notesift suggest re
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// notesift - real-time note search
#[derive(Parser)]
#[command(name = "notesift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "NOTESIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the notes database (overrides the configured one)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from the notes database
    Index {
        /// Seed the starter notes if the database is empty
        #[arg(long)]
        sample: bool,
    },

    /// Search notes
    Query {
        /// Query text (supports "phrases", tag:name, #name and title:word)
        text: String,

        /// Only notes carrying this tag (can be used multiple times)
        #[arg(short, long)]
        tag: Vec<String>,

        /// Match against titles only
        #[arg(long)]
        title_only: bool,

        /// Maximum number of results to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Suggest tags and terms for a prefix
    Suggest {
        prefix: String,

        /// Maximum number of suggestions
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show index status and statistics
    Status,

    /// Delete the snapshot cache
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => notesift_core::Config::load_from(path)?,
        None => notesift_core::Config::load()?,
    };
    if let Some(db) = cli.db {
        config.general.database_path = Some(db);
    }

    // Flags win over RUST_LOG, which wins over the config file.
    let level = if cli.quiet {
        Some("error")
    } else {
        match cli.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    };
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Index { sample } => commands::index::run(config, sample),
        Commands::Query {
            text,
            tag,
            title_only,
            limit,
            output,
        } => commands::query::run(config, &text, tag, title_only, limit, output),
        Commands::Suggest { prefix, limit } => commands::suggest::run(config, &prefix, limit),
        Commands::Status => commands::status::run(config),
        Commands::Clear { yes } => commands::clear::run(config, yes),
    }
}
