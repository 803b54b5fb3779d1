//! Per-period downsampling of raw samples.
//!
//! When aggregation applies to a point, each chunk's raw values are replaced
//! by one statistics record per aggregation period before the destination
//! write. The record lands at the period start with the period average as its
//! value; count and extremes travel in the annotation.

use super::chunk::align_floor;
use super::config::AggregationConfig;
use crate::{DataValue, PointValue};
use std::collections::BTreeMap;

/// Statistics accumulated over one aggregation period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodStats {
    /// Period start (Unix milliseconds)
    pub start: i64,
    /// Number of samples in the period
    pub count: u64,
    /// First sample value
    pub first: f64,
    /// Last sample value
    pub last: f64,
    /// Smallest sample value
    pub minimum: f64,
    /// Largest sample value
    pub maximum: f64,
    sum: f64,
}

impl PeriodStats {
    fn new(start: i64, value: f64) -> Self {
        Self {
            start,
            count: 1,
            first: value,
            last: value,
            minimum: value,
            maximum: value,
            sum: value,
        }
    }

    fn accumulate(&mut self, value: f64) {
        self.count += 1;
        self.last = value;
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
        self.sum += value;
    }

    /// Arithmetic mean of the period's samples.
    pub fn average(&self) -> f64 {
        self.sum / self.count as f64
    }

    /// Render the stats as one destination sample at the period start.
    pub fn into_point_value(self) -> PointValue {
        PointValue::annotated(
            self.start,
            DataValue::Numeric(self.average()),
            format!(
                "aggregate of {} samples (min {}, max {})",
                self.count, self.minimum, self.maximum
            ),
        )
    }
}

/// Collapse a chunk's values into per-period statistics.
///
/// `values` may include samples read back before `from` (the configured
/// overlap); they contribute to the period that straddles the chunk start so
/// that period is recomputed over its full data. Only periods starting at or
/// after the period containing `from` are emitted — earlier ones were
/// finalized by previous chunks. Samples without a numeric view are skipped.
pub fn aggregate_window(
    values: &[PointValue],
    from: i64,
    config: &AggregationConfig,
) -> Vec<PointValue> {
    let period_ms = config.period.to_milliseconds();
    let grid_offset = config.boundary_offset.rem_euclid(period_ms);
    let emit_from = align_floor(from, period_ms, grid_offset);

    let mut periods: BTreeMap<i64, PeriodStats> = BTreeMap::new();
    for value in values {
        let Some(v) = value.value.as_f64() else {
            continue;
        };
        let start = align_floor(value.timestamp, period_ms, grid_offset);
        if start < emit_from {
            continue;
        }
        periods
            .entry(start)
            .and_modify(|stats| stats.accumulate(v))
            .or_insert_with(|| PeriodStats::new(start, v));
    }

    periods
        .into_values()
        .map(PeriodStats::into_point_value)
        .collect()
}
