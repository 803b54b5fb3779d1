//! Per-point migration jobs.
//!
//! One job owns one data point for the lifetime of a run and walks its
//! backlog strictly forward: read checkpoint, compute the next window, copy
//! it, persist the new checkpoint, repeat until the window reaches "now".
//! Chunks within a point are never parallelized, which is what keeps
//! checkpoint advancement monotonic and restart-safe.

use super::aggregate::aggregate_window;
use super::chunk::{read_window, window_end, write_chunk};
use super::config::{calculate_backoff, MigrationConfig};
use super::progress::{MigrationProgressStore, ProgressRecord};
use super::MigrationError;
use crate::clock::{Clock, SharedClock};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use crate::store::PointValueStore;
use crate::{DataPoint, SeriesId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn, Instrument};

/// Migration status of one data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointStatus {
    /// No chunk has been migrated yet
    #[default]
    NotStarted,
    /// A job is walking this point's backlog
    InProgress,
    /// The backlog is fully migrated
    Completed,
    /// The retry budget was exhausted on a chunk
    Failed,
}

/// Progress counters for one point's job.
#[derive(Debug, Clone, Default)]
pub struct PointProgress {
    /// Samples read from the source so far
    pub migrated_samples: u64,
    /// Samples written to the destination so far (differs from
    /// `migrated_samples` when aggregating)
    pub written_samples: u64,
    /// Chunks completed so far
    pub chunks: u64,
    /// Failed chunk attempts so far
    pub retries: u64,
    /// Current checkpoint (exclusive upper bound of the migrated range)
    pub checkpoint: Option<i64>,
    /// Error message if the job failed
    pub error: Option<String>,
}

/// Live per-point state shared between jobs and the engine facade.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PointState {
    pub status: PointStatus,
    /// Exclusive upper bound of the migrated range; `i64::MIN` when nothing
    /// has been migrated yet
    pub checkpoint: i64,
    pub migrated_samples: u64,
}

impl PointState {
    pub(crate) fn not_started() -> Self {
        Self {
            status: PointStatus::NotStarted,
            checkpoint: i64::MIN,
            migrated_samples: 0,
        }
    }
}

/// Shared table of live point states, read by the engine facade on every
/// routed query.
pub(crate) type StateTable = RwLock<HashMap<SeriesId, PointState>>;

/// Result of one point's job.
#[derive(Debug, Clone)]
pub(crate) struct PointOutcome {
    pub point: DataPoint,
    pub status: PointStatus,
    pub progress: PointProgress,
}

/// A running migration job for one data point.
pub(crate) struct PointMigration {
    pub point: DataPoint,
    pub config: Arc<MigrationConfig>,
    pub source: Arc<dyn PointValueStore>,
    pub destination: Arc<dyn PointValueStore>,
    pub progress_store: Arc<dyn MigrationProgressStore>,
    pub clock: SharedClock,
    pub shutdown: SharedShutdown,
    pub states: Arc<StateTable>,
}

impl PointMigration {
    /// Drive this point's backlog to "now", or until failure or shutdown.
    pub async fn run(self) -> PointOutcome {
        let span = tracing::info_span!(
            "migrate_point",
            series = %self.point.series_id,
            xid = %self.point.xid
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> PointOutcome {
        let series = self.point.series_id;
        let mut progress = PointProgress::default();

        // Load the stored record and the starting checkpoint, retrying like
        // any other chunk step: a briefly unavailable progress store must not
        // fail the point outright.
        let mut attempt = 0u32;
        let (record, start) = loop {
            if self.shutdown.is_shutdown_requested() {
                return self.finish(PointStatus::InProgress, progress);
            }
            match self.resolve_start().await {
                Ok(resolved) => break resolved,
                Err(e) => {
                    attempt += 1;
                    progress.retries += 1;
                    metrics::record_chunk_retry();
                    warn!(error = %e, attempt, "Failed to prepare point migration");
                    if attempt >= self.config.max_attempts {
                        return self
                            .fail(progress, e.to_string(), attempt as u64, attempt as u64)
                            .await;
                    }
                    if !self.backoff_or_shutdown(attempt).await {
                        return self.finish(PointStatus::InProgress, progress);
                    }
                }
            }
        };

        let mut total_attempts = record.as_ref().map(|r| r.attempts).unwrap_or(0);
        let mut total_failures = record.as_ref().map(|r| r.failures).unwrap_or(0);

        if record.as_ref().is_some_and(|r| r.completed) {
            debug!("Point already migrated, nothing to do");
            progress.checkpoint = record.map(|r| r.checkpoint);
            self.set_state(PointStatus::Completed, progress.checkpoint.unwrap_or(start), 0);
            return self.finish(PointStatus::Completed, progress);
        }

        let mut checkpoint = start;
        progress.checkpoint = Some(checkpoint);
        self.set_state(PointStatus::InProgress, checkpoint, 0);
        info!(checkpoint, "Starting point migration");

        let mut chunk_attempts = 0u32;
        loop {
            if self.shutdown.is_shutdown_requested() {
                info!(checkpoint, "Shutdown requested - leaving point resumable");
                return self.finish(PointStatus::InProgress, progress);
            }

            let now = self.clock.now_millis();
            if checkpoint >= now {
                // Backlog exhausted: everything before "now" is migrated.
                let mut done = ProgressRecord::new(series, checkpoint);
                done.attempts = total_attempts;
                done.failures = total_failures;
                done.completed = true;
                if let Err(e) = self.progress_store.save(done).await {
                    chunk_attempts += 1;
                    total_failures += 1;
                    progress.retries += 1;
                    metrics::record_chunk_retry();
                    warn!(error = %e, "Failed to persist completion record");
                    if chunk_attempts >= self.config.max_attempts {
                        return self
                            .fail(progress, e.to_string(), total_attempts, total_failures)
                            .await;
                    }
                    if !self.backoff_or_shutdown(chunk_attempts).await {
                        return self.finish(PointStatus::InProgress, progress);
                    }
                    continue;
                }
                self.set_state(PointStatus::Completed, checkpoint, progress.migrated_samples);
                info!(
                    chunks = progress.chunks,
                    samples = progress.migrated_samples,
                    "Point migration completed"
                );
                metrics::record_point_migrated(progress.migrated_samples);
                return self.finish(PointStatus::Completed, progress);
            }

            let end = window_end(checkpoint, now, self.config.migration_period, &self.config.zone);
            total_attempts += 1;

            match self.migrate_chunk(checkpoint, end).await {
                Ok((read, written)) => {
                    let mut record = ProgressRecord::new(series, end);
                    record.attempts = total_attempts;
                    record.failures = total_failures;
                    if let Err(e) = self.progress_store.save(record).await {
                        // The write is an upsert, so retrying the whole chunk
                        // after a failed checkpoint save is safe.
                        chunk_attempts += 1;
                        total_failures += 1;
                        progress.retries += 1;
                        metrics::record_chunk_retry();
                        warn!(error = %e, from = checkpoint, to = end, "Failed to persist checkpoint");
                        if chunk_attempts >= self.config.max_attempts {
                            return self
                                .fail(progress, e.to_string(), total_attempts, total_failures)
                                .await;
                        }
                        if !self.backoff_or_shutdown(chunk_attempts).await {
                            return self.finish(PointStatus::InProgress, progress);
                        }
                        continue;
                    }

                    checkpoint = end;
                    chunk_attempts = 0;
                    progress.chunks += 1;
                    progress.migrated_samples += read;
                    progress.written_samples += written;
                    progress.checkpoint = Some(checkpoint);
                    self.set_state(PointStatus::InProgress, checkpoint, progress.migrated_samples);
                    debug!(
                        checkpoint,
                        read,
                        written,
                        "Chunk migrated"
                    );
                }
                Err(e) => {
                    chunk_attempts += 1;
                    total_failures += 1;
                    progress.retries += 1;
                    metrics::record_chunk_retry();
                    warn!(
                        error = %e,
                        from = checkpoint,
                        to = end,
                        attempt = chunk_attempts,
                        max_attempts = self.config.max_attempts,
                        "Chunk migration attempt failed"
                    );
                    if chunk_attempts >= self.config.max_attempts {
                        return self
                            .fail(progress, e.to_string(), total_attempts, total_failures)
                            .await;
                    }
                    if !self.backoff_or_shutdown(chunk_attempts).await {
                        return self.finish(PointStatus::InProgress, progress);
                    }
                }
            }
        }
    }

    /// Load the stored record and decide where this point starts.
    ///
    /// Priority: stored checkpoint, then the configured start of the run,
    /// then the beginning of the source series. A series with no data at all
    /// starts at "now" and completes on the first loop turn.
    async fn resolve_start(&self) -> Result<(Option<ProgressRecord>, i64), MigrationError> {
        let record = self.progress_store.get(self.point.series_id).await?;
        if let Some(r) = &record {
            return Ok((record.clone(), r.checkpoint));
        }
        if let Some(from) = self.config.migrate_from {
            return Ok((record, from));
        }
        let start = match self.source.time_range(self.point.series_id).await? {
            Some((first, _)) => first,
            None => self.clock.now_millis(),
        };
        Ok((record, start))
    }

    /// Copy one window `[from, to)`: read, optionally aggregate, write.
    /// Returns `(samples_read, samples_written)`.
    async fn migrate_chunk(&self, from: i64, to: i64) -> Result<(u64, u64), MigrationError> {
        let aggregation = self.config.aggregation_for(self.point.data_type);
        let read_from = match aggregation {
            Some(agg) => from - agg.overlap,
            None => from,
        };

        let values = read_window(
            self.source.as_ref(),
            self.point.series_id,
            read_from,
            to,
            self.config.read_chunk_size,
        )
        .await?;
        let read = values.iter().filter(|v| v.timestamp >= from).count() as u64;

        let output = match aggregation {
            Some(agg) => aggregate_window(&values, from, agg),
            None => values,
        };

        let written = write_chunk(
            self.destination.as_ref(),
            self.point.series_id,
            &output,
            self.config.write_chunk_size,
        )
        .await? as u64;

        Ok((read, written))
    }

    /// Sleep the backoff delay unless shutdown arrives first.
    async fn backoff_or_shutdown(&self, attempt: u32) -> bool {
        let backoff = calculate_backoff(attempt.saturating_sub(1));
        tokio::select! {
            _ = tokio::time::sleep(backoff) => true,
            _ = self.shutdown.wait_for_shutdown() => false,
        }
    }

    async fn fail(
        &self,
        mut progress: PointProgress,
        error: String,
        attempts: u64,
        failures: u64,
    ) -> PointOutcome {
        tracing::error!(error = %error, "Point migration failed - retry budget exhausted");
        progress.error = Some(error);
        let checkpoint = progress.checkpoint.unwrap_or(i64::MIN);
        if let Some(reached) = progress.checkpoint {
            // Best effort: keep the attempt counters with the checkpoint so a
            // later run (and the status command) see the failure history.
            let mut record = ProgressRecord::new(self.point.series_id, reached);
            record.attempts = attempts;
            record.failures = failures;
            if let Err(e) = self.progress_store.save(record).await {
                warn!(error = %e, "Failed to persist failure record");
            }
        }
        self.set_state(PointStatus::Failed, checkpoint, progress.migrated_samples);
        metrics::record_point_failed();
        self.finish(PointStatus::Failed, progress)
    }

    fn finish(&self, status: PointStatus, progress: PointProgress) -> PointOutcome {
        PointOutcome {
            point: self.point.clone(),
            status,
            progress,
        }
    }

    fn set_state(&self, status: PointStatus, checkpoint: i64, migrated_samples: u64) {
        let mut states = self.states.write().unwrap();
        states.insert(
            self.point.series_id,
            PointState {
                status,
                checkpoint,
                migrated_samples,
            },
        );
    }
}
