//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// humdata: aggregate humanitarian data sources into per-country reports
#[derive(Parser)]
#[command(name = "humdata")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline and publish the report
    Run {
        /// Path to the pipeline configuration (TOML)
        #[arg(short, long, value_name = "CONFIG")]
        config: PathBuf,

        /// Output path for the report (default: [run].output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration without loading any source
    Check {
        /// Path to the pipeline configuration (TOML)
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Load one configured source and show what it yields
    Inspect {
        /// Path to the pipeline configuration (TOML)
        #[arg(short, long, value_name = "CONFIG")]
        config: PathBuf,

        /// Source name as declared in the configuration
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Number of rows to show
        #[arg(short = 'n', long, default_value = "10")]
        rows: usize,

        /// Only show rows whose key best matches this country
        #[arg(long, value_name = "NAME")]
        country: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile a country name against the canonical list
    Match {
        /// Raw country name or code
        #[arg(value_name = "NAME")]
        name: String,

        /// Pipeline configuration providing the country list
        #[arg(short, long, value_name = "CONFIG", conflicts_with = "countries")]
        config: Option<PathBuf>,

        /// CSV with code,name,aliases columns
        #[arg(long, value_name = "CSV")]
        countries: Option<PathBuf>,

        /// Minimum confidence (0-100) to accept a match
        #[arg(long)]
        min_confidence: Option<u8>,
    },
}
