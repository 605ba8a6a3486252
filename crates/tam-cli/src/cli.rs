use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tam", author, version, about = "Territory assignment engine", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Path to a TOML configuration file (overrides snapshot-embedded
    /// configuration)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate assignment proposals for one cohort of a build
    Assign {
        /// Build identifier the proposals belong to
        #[arg(long)]
        build: String,
        /// Cohort to assign: customer or prospect
        #[arg(long)]
        cohort: String,
        /// Tier filter: Commercial, Enterprise or All
        #[arg(long, default_value = "All")]
        tier: String,
        /// Input snapshot (JSON)
        #[arg(long)]
        snapshot: PathBuf,
        /// Output directory for proposals, warnings and the run manifest
        #[arg(long, default_value = "tam-out")]
        out: PathBuf,
        /// Compute and report only; write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Calibrate and print the per-rep threshold bands for a cohort
    Calibrate {
        /// Build identifier (reporting only)
        #[arg(long)]
        build: String,
        /// Cohort to calibrate: customer or prospect
        #[arg(long)]
        cohort: String,
        /// Input snapshot (JSON)
        #[arg(long)]
        snapshot: PathBuf,
    },
}
