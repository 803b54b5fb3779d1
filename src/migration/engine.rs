//! Migration orchestrator and storage facade.
//!
//! [`MigrationEngine`] plays two roles. As an orchestrator it fans per-point
//! jobs out over a bounded worker pool and collects their outcomes into a
//! [`MigrationSummary`]. As a [`PointValueStore`] it stands in for the raw
//! store: reads are stitched across source and destination according to each
//! point's live migration state, writes always land in the destination.
//!
//! The read stitching contract is that a caller sees no duplicate and no
//! missing sample regardless of migration state. The source is frozen at the
//! instant the engine is built (the "live boundary"); from then on the
//! destination owns everything at or after that instant and the migrated
//! prefix before it, and the source serves the not-yet-migrated middle.

use super::config::MigrationConfig;
use super::progress::MigrationProgressStore;
use super::worker::{PointMigration, PointOutcome, PointState, PointStatus, StateTable};
use super::MigrationError;
use crate::catalog::DataPointCatalog;
use crate::clock::{Clock, SharedClock, SystemClock};
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};
use crate::store::{PointValueStore, PointValueStream, StoreResult, TimeOrder};
use crate::{PointValue, SeriesId};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A point whose migration exhausted its retry budget.
#[derive(Debug, Clone)]
pub struct FailedPoint {
    /// Series of the failed point
    pub series_id: SeriesId,
    /// External identifier of the failed point
    pub xid: String,
    /// The error that ended the job
    pub error: String,
}

/// Aggregate result of one migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationSummary {
    /// Points whose backlog is fully migrated
    pub completed: Vec<SeriesId>,
    /// Points that exhausted their retry budget, with the final error
    pub failed: Vec<FailedPoint>,
    /// Points interrupted by shutdown; they resume from their checkpoint on
    /// the next run
    pub cancelled: Vec<SeriesId>,
    /// Total samples read from the source across all points
    pub migrated_samples: u64,
    /// Set when the run aborted before jobs could be scheduled
    pub aborted: Option<String>,
}

impl MigrationSummary {
    fn aborted(reason: String) -> Self {
        Self {
            aborted: Some(reason),
            ..Self::default()
        }
    }

    /// Whether every selected point migrated to completion.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty() && self.aborted.is_none()
    }
}

/// Point-in-time view of a running migration.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSnapshot {
    /// Points selected for this run
    pub total_points: usize,
    /// Points fully migrated so far
    pub completed_points: usize,
    /// Points that failed so far
    pub failed_points: usize,
    /// Points currently walking their backlog
    pub in_progress_points: usize,
    /// Samples read from the source so far
    pub migrated_samples: u64,
}

/// Builder for [`MigrationEngine`].
pub struct MigrationEngineBuilder {
    config: MigrationConfig,
    source: Arc<dyn PointValueStore>,
    destination: Arc<dyn PointValueStore>,
    catalog: Arc<dyn DataPointCatalog>,
    progress_store: Arc<dyn MigrationProgressStore>,
    clock: Option<SharedClock>,
    shutdown: Option<SharedShutdown>,
}

impl MigrationEngineBuilder {
    /// Use a custom time source (a simulated clock in tests).
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Finish the engine. Honors `auto_start` from the configuration.
    pub fn build(self) -> Arc<MigrationEngine> {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let shutdown = self.shutdown.unwrap_or_else(ShutdownCoordinator::shared);
        let live_boundary = clock.now_millis();
        let (finished_tx, finished_rx) = watch::channel(None);

        let engine = Arc::new(MigrationEngine {
            config: Arc::new(self.config),
            source: self.source,
            destination: self.destination,
            catalog: self.catalog,
            progress_store: self.progress_store,
            clock,
            shutdown,
            live_boundary,
            running: AtomicBool::new(false),
            states: Arc::new(StateTable::default()),
            total_points: Arc::new(AtomicUsize::new(0)),
            driver: Mutex::new(None),
            finished_tx: Mutex::new(Some(finished_tx)),
            finished_rx,
        });

        if engine.config.auto_start {
            // A freshly built engine cannot already be running.
            let _ = engine.start();
        }
        engine
    }
}

/// The migration orchestrator and drop-in point value store.
pub struct MigrationEngine {
    config: Arc<MigrationConfig>,
    source: Arc<dyn PointValueStore>,
    destination: Arc<dyn PointValueStore>,
    catalog: Arc<dyn DataPointCatalog>,
    progress_store: Arc<dyn MigrationProgressStore>,
    clock: SharedClock,
    shutdown: SharedShutdown,
    /// Instant the source froze; destination owns all samples at or after it
    live_boundary: i64,
    running: AtomicBool,
    states: Arc<StateTable>,
    total_points: Arc<AtomicUsize>,
    driver: Mutex<Option<JoinHandle<()>>>,
    finished_tx: Mutex<Option<watch::Sender<Option<MigrationSummary>>>>,
    finished_rx: watch::Receiver<Option<MigrationSummary>>,
}

impl MigrationEngine {
    /// Start describing an engine over the given collaborators.
    pub fn new(
        config: MigrationConfig,
        source: Arc<dyn PointValueStore>,
        destination: Arc<dyn PointValueStore>,
        catalog: Arc<dyn DataPointCatalog>,
        progress_store: Arc<dyn MigrationProgressStore>,
    ) -> MigrationEngineBuilder {
        MigrationEngineBuilder {
            config,
            source,
            destination,
            catalog,
            progress_store,
            clock: None,
            shutdown: None,
        }
    }

    /// Kick off the migration. One-shot: a second call, or a call while jobs
    /// are still running, is rejected with [`MigrationError::AlreadyRunning`].
    pub fn start(&self) -> Result<(), MigrationError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MigrationError::AlreadyRunning);
        }
        let Some(finished_tx) = self.finished_tx.lock().unwrap().take() else {
            return Err(MigrationError::AlreadyRunning);
        };

        let ctx = DriverContext {
            config: Arc::clone(&self.config),
            source: Arc::clone(&self.source),
            destination: Arc::clone(&self.destination),
            catalog: Arc::clone(&self.catalog),
            progress_store: Arc::clone(&self.progress_store),
            clock: Arc::clone(&self.clock),
            shutdown: Arc::clone(&self.shutdown),
            states: Arc::clone(&self.states),
            total_points: Arc::clone(&self.total_points),
        };

        let handle = tokio::spawn(async move {
            let summary = run_driver(ctx).await;
            let _ = finished_tx.send(Some(summary));
        });
        *self.driver.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Wait until every scheduled job reached its final state.
    ///
    /// Safe to call from any number of tasks; callers may wrap it in their
    /// own timeout without cancelling the underlying jobs.
    pub async fn wait_finished(&self) -> Result<MigrationSummary, MigrationError> {
        if let Some(summary) = self.finished_rx.borrow().clone() {
            return Ok(summary);
        }
        if !self.running.load(Ordering::SeqCst) {
            return Err(MigrationError::NotStarted);
        }
        let mut rx = self.finished_rx.clone();
        loop {
            if let Some(summary) = rx.borrow_and_update().clone() {
                return Ok(summary);
            }
            if rx.changed().await.is_err() {
                return rx
                    .borrow()
                    .clone()
                    .ok_or_else(|| MigrationError::Aborted("migration driver terminated".into()));
            }
        }
    }

    /// [`Self::wait_finished`] with a deadline. Elapsing yields
    /// [`MigrationError::WaitTimeout`], which is distinct from a migration
    /// failure (failures live inside a successfully awaited summary).
    pub async fn wait_finished_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<MigrationSummary, MigrationError> {
        match tokio::time::timeout(timeout, self.wait_finished()).await {
            Ok(result) => result,
            Err(_) => Err(MigrationError::WaitTimeout(timeout)),
        }
    }

    /// Request shutdown and wait up to the configured grace period for
    /// in-flight chunks, then abort the driver outright. Progress persists
    /// per chunk, so an aborted run resumes at its checkpoints.
    pub async fn close(&self) {
        self.shutdown.request_shutdown();
        let grace = self.config.close_wait;
        if tokio::time::timeout(grace, self.wait_finished())
            .await
            .is_err()
        {
            warn!(?grace, "Close grace period elapsed - aborting migration driver");
            if let Some(handle) = self.driver.lock().unwrap().take() {
                handle.abort();
            }
        }
    }

    /// Current progress counts across all selected points.
    pub fn snapshot(&self) -> EngineSnapshot {
        let states = self.states.read().unwrap();
        let mut snapshot = EngineSnapshot {
            total_points: self.total_points.load(Ordering::SeqCst),
            ..EngineSnapshot::default()
        };
        for state in states.values() {
            snapshot.migrated_samples += state.migrated_samples;
            match state.status {
                PointStatus::Completed => snapshot.completed_points += 1,
                PointStatus::Failed => snapshot.failed_points += 1,
                PointStatus::InProgress => snapshot.in_progress_points += 1,
                PointStatus::NotStarted => {}
            }
        }
        snapshot
    }

    fn point_state(&self, series: SeriesId) -> PointState {
        self.states
            .read()
            .unwrap()
            .get(&series)
            .copied()
            .unwrap_or_else(PointState::not_started)
    }
}

#[async_trait]
impl PointValueStore for MigrationEngine {
    /// New samples always land in the destination, keeping the system live
    /// while historical backfill is still running.
    async fn save_point_values(&self, series: SeriesId, values: &[PointValue]) -> StoreResult<()> {
        self.destination.save_point_values(series, values).await
    }

    async fn stream_point_values(
        &self,
        series: SeriesId,
        from: i64,
        to: i64,
        limit: Option<usize>,
        order: TimeOrder,
    ) -> StoreResult<PointValueStream> {
        let state = self.point_state(series);
        let checkpoint = state.checkpoint;

        // Once the migrated prefix reaches the live boundary the destination
        // covers the whole timeline for this series.
        if state.status == PointStatus::Completed || checkpoint >= self.live_boundary {
            return self
                .destination
                .stream_point_values(series, from, to, limit, order)
                .await;
        }

        // Split the query at the checkpoint and the live boundary:
        // migrated history and live samples from the destination, the
        // un-migrated middle from the (frozen) source.
        let mut segments: Vec<(&Arc<dyn PointValueStore>, i64, i64)> = vec![
            (&self.destination, from, to.min(checkpoint)),
            (&self.source, from.max(checkpoint), to.min(self.live_boundary)),
            (&self.destination, from.max(self.live_boundary), to),
        ];
        if order == TimeOrder::Descending {
            segments.reverse();
        }

        let mut streams = Vec::new();
        for (store, seg_from, seg_to) in segments {
            if seg_from < seg_to {
                streams.push(
                    store
                        .stream_point_values(series, seg_from, seg_to, limit, order)
                        .await?,
                );
            }
        }

        let combined = stream::iter(streams).flatten();
        Ok(match limit {
            Some(n) => Box::pin(combined.take(n)),
            None => Box::pin(combined),
        })
    }

    async fn get_point_value_at(
        &self,
        series: SeriesId,
        timestamp: i64,
    ) -> StoreResult<Option<PointValue>> {
        let state = self.point_state(series);
        if state.status == PointStatus::Completed
            || timestamp < state.checkpoint
            || timestamp >= self.live_boundary
        {
            return self.destination.get_point_value_at(series, timestamp).await;
        }
        self.source.get_point_value_at(series, timestamp).await
    }

    async fn time_range(&self, series: SeriesId) -> StoreResult<Option<(i64, i64)>> {
        let source_range = self.source.time_range(series).await?;
        let destination_range = self.destination.time_range(series).await?;
        Ok(match (source_range, destination_range) {
            (Some((sf, sl)), Some((df, dl))) => Some((sf.min(df), sl.max(dl))),
            (Some(range), None) | (None, Some(range)) => Some(range),
            (None, None) => None,
        })
    }
}

/// Everything the background driver needs, detached from the engine so the
/// facade stays usable while the driver runs.
struct DriverContext {
    config: Arc<MigrationConfig>,
    source: Arc<dyn PointValueStore>,
    destination: Arc<dyn PointValueStore>,
    catalog: Arc<dyn DataPointCatalog>,
    progress_store: Arc<dyn MigrationProgressStore>,
    clock: SharedClock,
    shutdown: SharedShutdown,
    states: Arc<StateTable>,
    total_points: Arc<AtomicUsize>,
}

async fn run_driver(ctx: DriverContext) -> MigrationSummary {
    let started_at = Instant::now();

    let points = match ctx.catalog.list_points().await {
        Ok(points) => points,
        Err(e) => {
            error!(error = %e, "Failed to enumerate data points");
            return MigrationSummary::aborted(format!("failed to enumerate data points: {e}"));
        }
    };

    let mut selected = Vec::new();
    for point in points {
        if let Err(e) = point.validate() {
            warn!(xid = %point.xid, error = %e, "Excluding invalid data point");
            continue;
        }
        if !ctx.config.selects(&point) {
            debug!(xid = %point.xid, "Point filtered out of migration");
            continue;
        }
        if ctx.config.aggregation_conflicts(point.data_type) {
            warn!(
                xid = %point.xid,
                data_type = %point.data_type,
                "Excluding point: aggregation configured for a type without numeric statistics"
            );
            continue;
        }
        selected.push(point);
    }

    let mut failed = Vec::new();
    if ctx.config.start_new_migration {
        let mut cleared = Vec::with_capacity(selected.len());
        for point in selected {
            match ctx.progress_store.clear(point.series_id).await {
                Ok(()) => cleared.push(point),
                Err(e) => {
                    // Without a clean slate the point would silently resume,
                    // which is not what a restart asked for.
                    warn!(xid = %point.xid, error = %e, "Failed to reset progress record");
                    ctx.states.write().unwrap().insert(
                        point.series_id,
                        PointState {
                            status: PointStatus::Failed,
                            checkpoint: i64::MIN,
                            migrated_samples: 0,
                        },
                    );
                    failed.push(FailedPoint {
                        series_id: point.series_id,
                        xid: point.xid,
                        error: format!("failed to reset progress record: {e}"),
                    });
                }
            }
        }
        selected = cleared;
    }

    // Seed the facade states before the first chunk so routed reads already
    // respect persisted checkpoints.
    for point in &selected {
        let state = match ctx.progress_store.get(point.series_id).await {
            Ok(Some(record)) => PointState {
                status: if record.completed {
                    PointStatus::Completed
                } else {
                    PointStatus::NotStarted
                },
                checkpoint: record.checkpoint,
                migrated_samples: 0,
            },
            Ok(None) => PointState::not_started(),
            Err(e) => {
                warn!(xid = %point.xid, error = %e, "Failed to read progress record; treating as fresh");
                PointState::not_started()
            }
        };
        ctx.states.write().unwrap().insert(point.series_id, state);
    }
    ctx.total_points
        .store(selected.len() + failed.len(), Ordering::SeqCst);

    info!(
        points = selected.len(),
        excluded_failed = failed.len(),
        workers = ctx.config.worker_count,
        period = %ctx.config.migration_period,
        "Migration started"
    );

    let logger = spawn_progress_logger(
        Arc::clone(&ctx.states),
        Arc::clone(&ctx.total_points),
        ctx.config.log_period,
    );

    let jobs = selected.into_iter().map(|point| {
        PointMigration {
            point,
            config: Arc::clone(&ctx.config),
            source: Arc::clone(&ctx.source),
            destination: Arc::clone(&ctx.destination),
            progress_store: Arc::clone(&ctx.progress_store),
            clock: Arc::clone(&ctx.clock),
            shutdown: Arc::clone(&ctx.shutdown),
            states: Arc::clone(&ctx.states),
        }
        .run()
    });
    let outcomes: Vec<PointOutcome> = stream::iter(jobs)
        .buffer_unordered(ctx.config.worker_count)
        .collect()
        .await;

    logger.abort();

    let mut summary = MigrationSummary {
        failed,
        ..MigrationSummary::default()
    };
    for outcome in outcomes {
        summary.migrated_samples += outcome.progress.migrated_samples;
        match outcome.status {
            PointStatus::Completed => summary.completed.push(outcome.point.series_id),
            PointStatus::Failed => summary.failed.push(FailedPoint {
                series_id: outcome.point.series_id,
                xid: outcome.point.xid,
                error: outcome
                    .progress
                    .error
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            PointStatus::NotStarted | PointStatus::InProgress => {
                summary.cancelled.push(outcome.point.series_id)
            }
        }
    }
    summary.completed.sort();
    summary.cancelled.sort();
    summary.failed.sort_by_key(|f| f.series_id);

    info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        cancelled = summary.cancelled.len(),
        samples = summary.migrated_samples,
        elapsed = ?started_at.elapsed(),
        "Migration finished"
    );
    summary
}

fn spawn_progress_logger(
    states: Arc<StateTable>,
    total_points: Arc<AtomicUsize>,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; the start of the run is already
        // logged by the driver.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (completed, failed, in_progress, samples) = {
                let states = states.read().unwrap();
                let mut completed = 0usize;
                let mut failed = 0usize;
                let mut in_progress = 0usize;
                let mut samples = 0u64;
                for state in states.values() {
                    samples += state.migrated_samples;
                    match state.status {
                        PointStatus::Completed => completed += 1,
                        PointStatus::Failed => failed += 1,
                        PointStatus::InProgress => in_progress += 1,
                        PointStatus::NotStarted => {}
                    }
                }
                (completed, failed, in_progress, samples)
            };
            crate::metrics::set_points_in_progress(in_progress);
            info!(
                total = total_points.load(Ordering::SeqCst),
                completed,
                in_progress,
                failed,
                samples,
                "Migration progress"
            );
        }
    })
}
