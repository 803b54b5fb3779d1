//! `status` command: inspect persisted migration progress.

use super::CliError;
use crate::migration::progress::{FileProgressStore, MigrationProgressStore};
use chrono::DateTime;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the `status` command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Directory of persisted progress records
    #[arg(long)]
    pub progress_dir: PathBuf,
}

impl StatusArgs {
    /// Print the stored progress record of every point.
    pub async fn execute(&self) -> Result<(), CliError> {
        let store = FileProgressStore::open(&self.progress_dir)?;
        let records = store.all().await?;

        if records.is_empty() {
            println!("No migration progress recorded in {}", self.progress_dir.display());
            return Ok(());
        }

        println!(
            "{:<10} {:<26} {:<10} {:>9} {:>9}",
            "SERIES", "CHECKPOINT", "STATE", "ATTEMPTS", "FAILURES"
        );
        for record in records {
            let checkpoint = DateTime::from_timestamp_millis(record.checkpoint)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| record.checkpoint.to_string());
            let state = if record.completed { "completed" } else { "partial" };
            println!(
                "{:<10} {:<26} {:<10} {:>9} {:>9}",
                record.series_id, checkpoint, state, record.attempts, record.failures
            );
        }
        Ok(())
    }
}
