//! In-memory point value store.
//!
//! Reference backend: one ordered map per series. Used in tests and wherever
//! an embedded, process-lifetime store is enough.

use super::{PointValueStore, PointValueStream, StoreResult, TimeOrder};
use crate::{PointValue, SeriesId};
use async_trait::async_trait;
use futures_util::stream;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory store backed by a `BTreeMap` per series.
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: RwLock<HashMap<SeriesId, BTreeMap<i64, PointValue>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total sample count across all series.
    pub fn sample_count(&self) -> usize {
        let series = self.series.read().unwrap();
        series.values().map(BTreeMap::len).sum()
    }

    fn collect_window(
        &self,
        series: SeriesId,
        from: i64,
        to: i64,
        limit: Option<usize>,
        order: TimeOrder,
    ) -> Vec<PointValue> {
        let guard = self.series.read().unwrap();
        let Some(samples) = guard.get(&series) else {
            return Vec::new();
        };
        let cap = limit.unwrap_or(usize::MAX);
        match order {
            TimeOrder::Ascending => samples
                .range(from..to)
                .take(cap)
                .map(|(_, v)| v.clone())
                .collect(),
            TimeOrder::Descending => samples
                .range(from..to)
                .rev()
                .take(cap)
                .map(|(_, v)| v.clone())
                .collect(),
        }
    }
}

#[async_trait]
impl PointValueStore for MemoryStore {
    async fn save_point_values(&self, series: SeriesId, values: &[PointValue]) -> StoreResult<()> {
        let mut guard = self.series.write().unwrap();
        let samples = guard.entry(series).or_default();
        for value in values {
            samples.insert(value.timestamp, value.clone());
        }
        Ok(())
    }

    async fn stream_point_values(
        &self,
        series: SeriesId,
        from: i64,
        to: i64,
        limit: Option<usize>,
        order: TimeOrder,
    ) -> StoreResult<PointValueStream> {
        let values = self.collect_window(series, from, to, limit, order);
        Ok(Box::pin(stream::iter(values.into_iter().map(Ok))))
    }

    async fn get_point_value_at(
        &self,
        series: SeriesId,
        timestamp: i64,
    ) -> StoreResult<Option<PointValue>> {
        let guard = self.series.read().unwrap();
        Ok(guard.get(&series).and_then(|s| s.get(&timestamp)).cloned())
    }

    async fn time_range(&self, series: SeriesId) -> StoreResult<Option<(i64, i64)>> {
        let guard = self.series.read().unwrap();
        Ok(guard.get(&series).and_then(|samples| {
            let first = samples.keys().next()?;
            let last = samples.keys().next_back()?;
            Some((*first, *last))
        }))
    }
}
