//! Point value storage backends.
//!
//! Everything that holds time-series samples sits behind the
//! [`PointValueStore`] trait: the source being drained, the destination being
//! filled, and the migration engine itself (which decorates both). Streams
//! are finite and ordered; a window query is restartable by re-issuing it
//! with the same bounds.

use crate::{PointValue, SeriesId};
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

pub mod csv;
pub mod memory;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Malformed record in the backend
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Stream of point values from a window query
pub type PointValueStream = Pin<Box<dyn Stream<Item = StoreResult<PointValue>> + Send>>;

/// Direction of a window query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrder {
    /// Oldest first
    #[default]
    Ascending,
    /// Newest first
    Descending,
}

/// A time-series sample store.
///
/// Window bounds are half-open: `[from, to)`. Writes are upserts keyed by
/// `(series, timestamp)`, which is what makes chunk retries idempotent.
#[async_trait]
pub trait PointValueStore: Send + Sync {
    /// Persist a batch of samples for one series. Re-writing an existing
    /// timestamp replaces that sample.
    async fn save_point_values(&self, series: SeriesId, values: &[PointValue]) -> StoreResult<()>;

    /// Stream samples of one series within `[from, to)`.
    ///
    /// Results are ordered by timestamp in the requested direction and capped
    /// at `limit` when given. An empty stream is a valid answer for a sparse
    /// window.
    async fn stream_point_values(
        &self,
        series: SeriesId,
        from: i64,
        to: i64,
        limit: Option<usize>,
        order: TimeOrder,
    ) -> StoreResult<PointValueStream>;

    /// Fetch the sample at exactly `timestamp`, if one exists.
    async fn get_point_value_at(
        &self,
        series: SeriesId,
        timestamp: i64,
    ) -> StoreResult<Option<PointValue>>;

    /// First and last sample timestamps of a series, if it has any data.
    async fn time_range(&self, series: SeriesId) -> StoreResult<Option<(i64, i64)>>;
}
