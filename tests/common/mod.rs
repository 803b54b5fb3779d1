//! Shared fixtures for the integration suite.

use async_trait::async_trait;
use point_value_migrator::store::memory::MemoryStore;
use point_value_migrator::store::{
    PointValueStore, PointValueStream, StoreError, StoreResult, TimeOrder,
};
use point_value_migrator::{DataPoint, DataType, DataValue, PointValue, SeriesId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Collect a stream into a vector, panicking on stream errors.
pub async fn collect(stream: PointValueStream) -> Vec<PointValue> {
    use futures_util::StreamExt;
    stream.map(|r| r.unwrap()).collect().await
}

/// Shorthand for a numeric sample.
pub fn numeric(ts: i64, v: f64) -> PointValue {
    PointValue::new(ts, DataValue::Numeric(v))
}

/// A numeric data point for the given series id.
pub fn numeric_point(id: i32) -> DataPoint {
    DataPoint::new(SeriesId(id), format!("DP_{id}"), format!("point {id}"), DataType::Numeric)
}

/// How a [`FlakyStore`] injects write failures.
#[derive(Debug, Clone, Copy)]
pub enum FailMode {
    /// The first `n` write calls fail, later ones succeed.
    FirstWrites(u64),
    /// The first `n` write calls succeed, later ones fail.
    AfterWrites(u64),
}

/// A store wrapper that injects transient or permanent write failures.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    mode: FailMode,
    /// When set, failures only hit this series; others pass through.
    only_series: Option<SeriesId>,
    write_calls: AtomicU64,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, mode: FailMode) -> Self {
        Self {
            inner,
            mode,
            only_series: None,
            write_calls: AtomicU64::new(0),
        }
    }

    pub fn for_series(inner: Arc<MemoryStore>, mode: FailMode, series: SeriesId) -> Self {
        Self {
            inner,
            mode,
            only_series: Some(series),
            write_calls: AtomicU64::new(0),
        }
    }

    /// Number of fault-eligible write calls attempted so far (failed ones included).
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PointValueStore for FlakyStore {
    async fn save_point_values(&self, series: SeriesId, values: &[PointValue]) -> StoreResult<()> {
        if self.only_series.is_some_and(|s| s != series) {
            return self.inner.save_point_values(series, values).await;
        }
        let call = self.write_calls.fetch_add(1, Ordering::SeqCst);
        let fail = match self.mode {
            FailMode::FirstWrites(n) => call < n,
            FailMode::AfterWrites(n) => call >= n,
        };
        if fail {
            return Err(StoreError::IoError(format!(
                "injected write failure on call {call}"
            )));
        }
        self.inner.save_point_values(series, values).await
    }

    async fn stream_point_values(
        &self,
        series: SeriesId,
        from: i64,
        to: i64,
        limit: Option<usize>,
        order: TimeOrder,
    ) -> StoreResult<PointValueStream> {
        self.inner
            .stream_point_values(series, from, to, limit, order)
            .await
    }

    async fn get_point_value_at(
        &self,
        series: SeriesId,
        timestamp: i64,
    ) -> StoreResult<Option<PointValue>> {
        self.inner.get_point_value_at(series, timestamp).await
    }

    async fn time_range(&self, series: SeriesId) -> StoreResult<Option<(i64, i64)>> {
        self.inner.time_range(series).await
    }
}
