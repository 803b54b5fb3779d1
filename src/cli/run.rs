//! `run` command: migrate between two CSV store directories.

use super::CliError;
use crate::migration::progress::FileProgressStore;
use crate::migration::{AggregationConfig, MigrationConfig, MigrationEngine, MigrationSummary};
use crate::shutdown::SharedShutdown;
use crate::store::csv::CsvStore;
use crate::{DataType, MigrationPeriod};
use chrono::{DateTime, NaiveDate};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Try to parse a datetime from RFC3339 format.
///
/// Handles inputs with and without timezone designators; a missing designator
/// is assumed UTC. Returns a timestamp in milliseconds, or `None` if parsing
/// fails.
fn try_parse_datetime_rfc3339(input: &str) -> Option<i64> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.timestamp_millis());
    }
    None
}

/// Parse a start time from YYYY-MM-DD or RFC3339 datetime format.
///
/// For date-only input, uses start-of-day (00:00:00 UTC).
fn parse_start_time_flexible(input: &str) -> Result<i64, CliError> {
    if let Some(ts) = try_parse_datetime_rfc3339(input) {
        return Ok(ts);
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid start time: {e}")))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument("Invalid start time".to_string()))?;
    Ok(datetime.and_utc().timestamp_millis())
}

/// Arguments for the `run` command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Directory of the source CSV store
    #[arg(long)]
    pub source_dir: PathBuf,

    /// Directory of the destination CSV store
    #[arg(long)]
    pub dest_dir: PathBuf,

    /// Directory for persisted progress records
    #[arg(long)]
    pub progress_dir: PathBuf,

    /// Number of points to migrate in parallel
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Chunk window span (15m, 30m, 1h, 4h, 12h, 1d, 1w, 1M)
    #[arg(long, default_value = "1d")]
    pub period: MigrationPeriod,

    /// Earliest time to migrate (YYYY-MM-DD or RFC3339); defaults to the
    /// beginning of each series
    #[arg(long)]
    pub from: Option<String>,

    /// Per-chunk attempt budget
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Rows fetched per source query
    #[arg(long, default_value_t = 16384)]
    pub read_chunk_size: usize,

    /// Rows per destination write batch
    #[arg(long, default_value_t = 4096)]
    pub write_chunk_size: usize,

    /// Seconds between progress log lines
    #[arg(long, default_value_t = 60)]
    pub log_period_secs: u64,

    /// Seconds to wait for in-flight chunks on Ctrl+C
    #[arg(long, default_value_t = 30)]
    pub close_wait_secs: u64,

    /// Discard persisted progress and start over
    #[arg(long)]
    pub restart: bool,

    /// Downsample matching points into one statistic per period
    #[arg(long)]
    pub aggregate_period: Option<MigrationPeriod>,

    /// Data types to downsample (numeric, binary, multistate)
    #[arg(long, value_delimiter = ',', default_value = "numeric")]
    pub aggregate_types: Vec<DataType>,

    /// Expose Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl RunArgs {
    /// Execute the migration run.
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<(), CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr).map_err(|e| CliError::Metrics(e.to_string()))?;
        }

        let source = Arc::new(CsvStore::open(&self.source_dir)?);
        let destination = Arc::new(CsvStore::open(&self.dest_dir)?);
        let progress = Arc::new(FileProgressStore::open(&self.progress_dir)?);
        let catalog = Arc::new(source.as_ref().clone());

        let mut config = MigrationConfig::new()
            .with_migration_period(self.period)
            .with_worker_count(self.workers)
            .with_max_attempts(self.max_attempts)
            .with_read_chunk_size(self.read_chunk_size)
            .with_write_chunk_size(self.write_chunk_size)
            .with_log_period(Duration::from_secs(self.log_period_secs))
            .with_close_wait(Duration::from_secs(self.close_wait_secs))
            .with_start_new_migration(self.restart);
        if let Some(from) = &self.from {
            config = config.with_migrate_from(parse_start_time_flexible(from)?);
        }
        if let Some(period) = self.aggregate_period {
            let types: HashSet<DataType> = self.aggregate_types.iter().copied().collect();
            config = config.with_aggregation(AggregationConfig::new(period, types));
        }

        let engine = MigrationEngine::new(config, source, destination, catalog, progress)
            .with_shutdown(shutdown.clone())
            .build();
        engine.start()?;

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} points {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let summary = loop {
            tokio::select! {
                result = engine.wait_finished() => break result?,
                _ = tokio::time::sleep(Duration::from_millis(500)) => {
                    let snapshot = engine.snapshot();
                    if snapshot.total_points > 0 {
                        bar.set_length(snapshot.total_points as u64);
                        bar.set_position((snapshot.completed_points + snapshot.failed_points) as u64);
                        bar.set_message(format!("{} samples", snapshot.migrated_samples));
                    }
                }
                _ = shutdown.wait_for_shutdown() => {
                    bar.set_message("shutting down...");
                    engine.close().await;
                    break match engine.wait_finished().await {
                        Ok(summary) => summary,
                        Err(e) => MigrationSummary {
                            aborted: Some(e.to_string()),
                            ..MigrationSummary::default()
                        },
                    };
                }
            }
        };
        bar.finish_and_clear();

        report(&summary);

        let unfinished = summary.failed.len() + summary.cancelled.len();
        if unfinished > 0 || summary.aborted.is_some() {
            let total = summary.completed.len() + unfinished;
            return Err(CliError::MigrationFailed {
                failed: unfinished,
                total,
            });
        }
        Ok(())
    }
}

fn report(summary: &MigrationSummary) {
    if let Some(reason) = &summary.aborted {
        println!("Migration aborted: {reason}");
        return;
    }
    println!(
        "Migration finished: {} points completed, {} samples copied",
        summary.completed.len(),
        summary.migrated_samples
    );
    for failure in &summary.failed {
        println!(
            "  FAILED  series {} ({}): {}",
            failure.series_id, failure.xid, failure.error
        );
    }
    for series in &summary.cancelled {
        println!("  STOPPED series {series}: resumes from its checkpoint on the next run");
    }
    info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        cancelled = summary.cancelled.len(),
        "Run summary reported"
    );
}
