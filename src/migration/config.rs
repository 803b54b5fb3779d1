//! Migration configuration and retry backoff policy.

use crate::{DataPoint, DataType, MigrationPeriod};
use chrono::FixedOffset;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Initial backoff delay in milliseconds.
/// 1 second lets a briefly overloaded backend drain before the next attempt
/// without stalling recovery from one-off failures.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay in milliseconds.
/// 30 seconds caps exponential backoff so a point with a struggling backend
/// keeps probing at a useful rate instead of sleeping for minutes.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Default per-chunk attempt budget (initial attempt + retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default rows fetched per source query.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16_384;

/// Default rows per destination write batch.
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 4_096;

/// Default number of points migrating in parallel.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Calculate exponential backoff delay for a retry attempt.
pub fn calculate_backoff(attempt: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

/// Predicate selecting which data points migrate.
pub type PointFilter = Arc<dyn Fn(&DataPoint) -> bool + Send + Sync>;

/// Downsampling settings applied while copying.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Span of one statistics period
    pub period: MigrationPeriod,
    /// Offset (milliseconds) shifting the period grid away from the epoch
    pub boundary_offset: i64,
    /// How far (milliseconds) a chunk reads back past its start so periods
    /// cut by a chunk boundary are recomputed over their full data
    pub overlap: i64,
    /// Data types whose points are aggregated instead of copied raw
    pub data_types: HashSet<DataType>,
}

impl AggregationConfig {
    /// Create aggregation settings for the given period and data types.
    ///
    /// The overlap defaults to one period, which is the smallest value that
    /// lets a boundary-cut period be rebuilt from a later chunk.
    pub fn new(period: MigrationPeriod, data_types: HashSet<DataType>) -> Self {
        Self {
            period,
            boundary_offset: 0,
            overlap: period.to_milliseconds(),
            data_types,
        }
    }

    /// Shift the period grid by an offset in milliseconds.
    pub fn with_boundary_offset(mut self, offset: i64) -> Self {
        self.boundary_offset = offset;
        self
    }

    /// Override the chunk read-back overlap in milliseconds.
    pub fn with_overlap(mut self, overlap: i64) -> Self {
        self.overlap = overlap.max(0);
        self
    }
}

/// Immutable description of one migration run.
///
/// Constructed once at startup through the `with_*` builder methods and
/// shared read-only between the engine and its workers.
#[derive(Clone)]
pub struct MigrationConfig {
    /// Earliest timestamp to migrate; `None` starts at the beginning of each
    /// source series
    pub migrate_from: Option<i64>,
    /// Time span of one chunk window
    pub migration_period: MigrationPeriod,
    /// UTC offset used to align chunk windows to calendar boundaries
    pub zone: FixedOffset,
    /// Per-chunk attempt budget (initial attempt + retries)
    pub max_attempts: u32,
    /// Start migrating as soon as the engine is built
    pub auto_start: bool,
    /// Discard persisted progress and start over instead of resuming
    pub start_new_migration: bool,
    /// Cadence of the periodic progress log line
    pub log_period: Duration,
    /// Rows fetched per source query
    pub read_chunk_size: usize,
    /// Rows per destination write batch
    pub write_chunk_size: usize,
    /// Number of points migrating in parallel
    pub worker_count: usize,
    /// Grace period for in-flight chunks during shutdown
    pub close_wait: Duration,
    /// Predicate selecting which points migrate; `None` selects all
    pub filter: Option<PointFilter>,
    /// Downsampling settings; `None` copies raw values for every type
    pub aggregation: Option<AggregationConfig>,
}

impl MigrationConfig {
    /// Create a configuration with production defaults.
    pub fn new() -> Self {
        Self {
            migrate_from: None,
            migration_period: MigrationPeriod::OneDay,
            zone: FixedOffset::east_opt(0).expect("zero offset is valid"),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            auto_start: false,
            start_new_migration: false,
            log_period: Duration::from_secs(60),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            close_wait: Duration::from_secs(30),
            filter: None,
            aggregation: None,
        }
    }

    /// Set the earliest timestamp to migrate.
    pub fn with_migrate_from(mut self, from: i64) -> Self {
        self.migrate_from = Some(from);
        self
    }

    /// Set the chunk window span.
    pub fn with_migration_period(mut self, period: MigrationPeriod) -> Self {
        self.migration_period = period;
        self
    }

    /// Set the UTC offset used for calendar-aligned chunk boundaries.
    pub fn with_zone(mut self, zone: FixedOffset) -> Self {
        self.zone = zone;
        self
    }

    /// Set the per-chunk attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Start migrating as soon as the engine is built.
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Discard persisted progress and start over instead of resuming.
    pub fn with_start_new_migration(mut self, start_new: bool) -> Self {
        self.start_new_migration = start_new;
        self
    }

    /// Set the cadence of the periodic progress log line.
    pub fn with_log_period(mut self, period: Duration) -> Self {
        self.log_period = period;
        self
    }

    /// Set the rows fetched per source query.
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the rows per destination write batch.
    pub fn with_write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size.max(1);
        self
    }

    /// Set the number of points migrating in parallel.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Set the shutdown grace period.
    pub fn with_close_wait(mut self, close_wait: Duration) -> Self {
        self.close_wait = close_wait;
        self
    }

    /// Set the point selection predicate.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&DataPoint) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Set the downsampling settings.
    pub fn with_aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Whether a point passes the configured filter.
    pub fn selects(&self, point: &DataPoint) -> bool {
        self.filter.as_ref().map(|f| f(point)).unwrap_or(true)
    }

    /// Aggregation settings applying to the given data type, if any.
    pub fn aggregation_for(&self, data_type: DataType) -> Option<&AggregationConfig> {
        self.aggregation
            .as_ref()
            .filter(|agg| agg.data_types.contains(&data_type))
    }

    /// Whether aggregation is configured for this data type but the type
    /// cannot produce numeric statistics. Such points are excluded from the
    /// run at selection time.
    pub fn aggregation_conflicts(&self, data_type: DataType) -> bool {
        self.aggregation_for(data_type).is_some() && data_type == DataType::Alphanumeric
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("migrate_from", &self.migrate_from)
            .field("migration_period", &self.migration_period)
            .field("zone", &self.zone)
            .field("max_attempts", &self.max_attempts)
            .field("auto_start", &self.auto_start)
            .field("start_new_migration", &self.start_new_migration)
            .field("log_period", &self.log_period)
            .field("read_chunk_size", &self.read_chunk_size)
            .field("write_chunk_size", &self.write_chunk_size)
            .field("worker_count", &self.worker_count)
            .field("close_wait", &self.close_wait)
            .field("filter", &self.filter.as_ref().map(|_| "<predicate>"))
            .field("aggregation", &self.aggregation)
            .finish()
    }
}
