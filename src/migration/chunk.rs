//! Chunk window planning and bounded reads/writes.
//!
//! Migration progress is driven by wall-clock windows, not by data presence:
//! a window with no samples still advances the checkpoint, so sparse points
//! complete in bounded time. Windows are half-open `[from, to)` and aligned
//! to the migration period grid in the configured zone, clipped to "now" so
//! a chunk never reads data that is still being finalized.

use crate::store::{PointValueStore, StoreResult, TimeOrder};
use crate::{MigrationPeriod, PointValue, SeriesId};
use chrono::FixedOffset;
use futures_util::StreamExt;

/// Largest grid boundary `<= ts` for a grid of `period_ms` shifted by
/// `grid_offset` milliseconds from the epoch.
pub fn align_floor(ts: i64, period_ms: i64, grid_offset: i64) -> i64 {
    (ts - grid_offset).div_euclid(period_ms) * period_ms + grid_offset
}

/// Offset of the calendar grid for a zone: boundaries fall where local time
/// (UTC + zone) is a multiple of the period.
pub fn zone_grid_offset(zone: &FixedOffset, period_ms: i64) -> i64 {
    (-(zone.local_minus_utc() as i64) * 1000).rem_euclid(period_ms)
}

/// Upper bound of the chunk window starting at `from`: the next calendar
/// boundary of `period` in `zone`, clipped to `now`.
///
/// Always strictly greater than `from` for `from < now`.
pub fn window_end(from: i64, now: i64, period: MigrationPeriod, zone: &FixedOffset) -> i64 {
    let period_ms = period.to_milliseconds();
    let offset = zone_grid_offset(zone, period_ms);
    let next = align_floor(from, period_ms, offset) + period_ms;
    next.min(now)
}

/// Read every sample of `series` in `[from, to)` in ascending order,
/// querying at most `read_chunk_size` rows at a time.
///
/// Re-issuing the call with the same window yields the same values, which is
/// what makes a retried chunk safe.
pub async fn read_window(
    store: &dyn PointValueStore,
    series: SeriesId,
    from: i64,
    to: i64,
    read_chunk_size: usize,
) -> StoreResult<Vec<PointValue>> {
    let mut values = Vec::new();
    let mut cursor = from;
    loop {
        let mut stream = store
            .stream_point_values(series, cursor, to, Some(read_chunk_size), TimeOrder::Ascending)
            .await?;

        let mut batch_len = 0usize;
        let mut last_ts = None;
        while let Some(result) = stream.next().await {
            let value = result?;
            last_ts = Some(value.timestamp);
            values.push(value);
            batch_len += 1;
        }

        if batch_len < read_chunk_size {
            break;
        }
        match last_ts {
            Some(ts) if ts + 1 < to => cursor = ts + 1,
            _ => break,
        }
    }
    Ok(values)
}

/// Write a chunk's values to `store` in batches of at most
/// `write_chunk_size` rows. Returns the number of samples written.
pub async fn write_chunk(
    store: &dyn PointValueStore,
    series: SeriesId,
    values: &[PointValue],
    write_chunk_size: usize,
) -> StoreResult<usize> {
    for batch in values.chunks(write_chunk_size) {
        store.save_point_values(series, batch).await?;
    }
    Ok(values.len())
}
