//! CLI command definitions and parsing
use crate::retrieval::SearchMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "coursemate",
    version,
    about = "Hybrid dense + lexical retrieval over course documents",
    long_about = "CourseMate ingests lecture notes and PDFs, indexes every chunk in a dense \
                  vector index and a BM25 keyword index, and answers queries by fusing both \
                  rankings with Reciprocal Rank Fusion."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/coursemate/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a text file or PDF
    Ingest {
        /// File to ingest
        file: PathBuf,

        /// Document title (defaults to the file name)
        #[arg(short, long)]
        title: Option<String>,

        /// Treat the file as a PDF even without a .pdf extension
        #[arg(long)]
        pdf: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search ingested documents
    Search {
        /// Search query text
        query: String,

        /// Number of results (defaults to retrieval.default_k)
        #[arg(short = 'k', long = "top-k")]
        k: Option<usize>,

        /// Retrieval mode: dense or hybrid
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Retry index writes that are pending or failed
    Reindex {
        /// Only this document
        #[arg(short, long)]
        document: Option<i64>,
    },

    /// Show store and index status
    Status {
        /// Show status in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check that the store opens and report counts
    Health,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
