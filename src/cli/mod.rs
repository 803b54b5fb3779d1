//! CLI command implementations.

use clap::{Parser, Subcommand};

use crate::migration::progress::ProgressError;
use crate::migration::MigrationError;
use crate::store::StoreError;

pub mod run;
pub mod status;

pub use run::RunArgs;
pub use status::StatusArgs;

/// Migrate historical point values between storage backends.
#[derive(Debug, Parser)]
#[command(name = "pvmigrate", version, about)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a migration between two CSV store directories
    Run(RunArgs),
    /// Show persisted migration progress
    Status(StatusArgs),
}

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Invalid command-line argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Progress store error
    #[error("progress error: {0}")]
    Progress(#[from] ProgressError),

    /// Engine error
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    /// The run finished but some points did not migrate
    #[error("{failed} of {total} points failed to migrate")]
    MigrationFailed {
        /// Points that failed or were cancelled
        failed: usize,
        /// Points selected for the run
        total: usize,
    },

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    Metrics(String),
}
