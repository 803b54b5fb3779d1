//! The engine as a drop-in store: stitched reads with no gap and no
//! duplicate in every migration state, writes always to the destination.

use crate::common::{collect, numeric, numeric_point, FailMode, FlakyStore};
use point_value_migrator::catalog::StaticCatalog;
use point_value_migrator::clock::SimulatedClock;
use point_value_migrator::migration::progress::MemoryProgressStore;
use point_value_migrator::migration::{MigrationConfig, MigrationEngine};
use point_value_migrator::store::memory::MemoryStore;
use point_value_migrator::store::{PointValueStore, TimeOrder};
use point_value_migrator::{DataValue, MigrationPeriod, PointValue};
use std::sync::Arc;
use std::time::Duration;

const DAY: i64 = 86_400_000;

fn history() -> Vec<PointValue> {
    vec![
        numeric(0, 1.0),
        numeric(DAY + 10, 2.0),
        numeric(2 * DAY + 10, 3.0),
    ]
}

#[tokio::test]
async fn test_reads_before_migration_come_from_source() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let point = numeric_point(1);
    source
        .save_point_values(point.series_id, &history())
        .await
        .unwrap();

    let now = 3 * DAY;
    let engine = MigrationEngine::new(
        MigrationConfig::new(),
        source,
        destination.clone(),
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        Arc::new(MemoryProgressStore::new()),
    )
    .with_clock(SimulatedClock::shared(now))
    .build();

    // Not started: history reads route to the source...
    let stream = engine
        .stream_point_values(point.series_id, 0, now, None, TimeOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(collect(stream).await, history());

    // ...while a live write goes to the destination and appears in the
    // merged view exactly once.
    let live = numeric(now + 50, 9.0);
    engine
        .save_point_values(point.series_id, std::slice::from_ref(&live))
        .await
        .unwrap();
    assert_eq!(destination.sample_count(), 1);

    let stream = engine
        .stream_point_values(point.series_id, 0, now + DAY, None, TimeOrder::Ascending)
        .await
        .unwrap();
    let mut expected = history();
    expected.push(live);
    assert_eq!(collect(stream).await, expected);
}

#[tokio::test]
async fn test_reads_after_migration_come_from_destination_only() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let point = numeric_point(1);
    source
        .save_point_values(point.series_id, &history())
        .await
        .unwrap();

    let now = 3 * DAY;
    let engine = MigrationEngine::new(
        MigrationConfig::new().with_migration_period(MigrationPeriod::OneDay),
        source.clone(),
        destination,
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        Arc::new(MemoryProgressStore::new()),
    )
    .with_clock(SimulatedClock::shared(now))
    .build();

    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();
    assert!(summary.all_succeeded());

    // Poison the source: a completed point must not touch it anymore.
    source
        .save_point_values(point.series_id, &[numeric(10, 999.0)])
        .await
        .unwrap();

    let stream = engine
        .stream_point_values(point.series_id, 0, now, None, TimeOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(collect(stream).await, history());

    let at = engine
        .get_point_value_at(point.series_id, DAY + 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at.value, DataValue::Numeric(2.0));
}

#[tokio::test]
async fn test_reads_during_partial_migration_stitch_without_gaps() {
    let source = Arc::new(MemoryStore::new());
    let inner = Arc::new(MemoryStore::new());
    let point = numeric_point(1);
    source
        .save_point_values(point.series_id, &history())
        .await
        .unwrap();

    // First chunk lands, every later write fails: the point ends Failed with
    // its checkpoint after day one.
    let destination = Arc::new(FlakyStore::new(inner.clone(), FailMode::AfterWrites(1)));
    let now = 3 * DAY;
    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .with_migration_period(MigrationPeriod::OneDay)
            .with_max_attempts(1),
        source,
        destination,
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        Arc::new(MemoryProgressStore::new()),
    )
    .with_clock(SimulatedClock::shared(now))
    .build();

    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(inner.sample_count(), 1);

    // The facade stitches migrated prefix (destination) and un-migrated
    // tail (source): the full history, once each.
    let stream = engine
        .stream_point_values(point.series_id, 0, now, None, TimeOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(collect(stream).await, history());

    // Same view descending.
    let stream = engine
        .stream_point_values(point.series_id, 0, now, None, TimeOrder::Descending)
        .await
        .unwrap();
    let mut reversed = history();
    reversed.reverse();
    assert_eq!(collect(stream).await, reversed);

    // Point lookups route by timestamp: migrated range from destination,
    // the rest from source.
    let migrated = engine
        .get_point_value_at(point.series_id, 0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(migrated.value, DataValue::Numeric(1.0));
    let unmigrated = engine
        .get_point_value_at(point.series_id, 2 * DAY + 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unmigrated.value, DataValue::Numeric(3.0));
}

#[tokio::test]
async fn test_limit_applies_across_stitched_segments() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let point = numeric_point(1);
    source
        .save_point_values(point.series_id, &history())
        .await
        .unwrap();

    let now = 3 * DAY;
    let engine = MigrationEngine::new(
        MigrationConfig::new(),
        source,
        destination,
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        Arc::new(MemoryProgressStore::new()),
    )
    .with_clock(SimulatedClock::shared(now))
    .build();

    let live = numeric(now + 50, 9.0);
    engine
        .save_point_values(point.series_id, std::slice::from_ref(&live))
        .await
        .unwrap();

    let stream = engine
        .stream_point_values(point.series_id, 0, now + DAY, Some(2), TimeOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(collect(stream).await, history()[..2].to_vec());

    let stream = engine
        .stream_point_values(point.series_id, 0, now + DAY, Some(2), TimeOrder::Descending)
        .await
        .unwrap();
    assert_eq!(collect(stream).await, vec![live, history()[2].clone()]);
}

#[tokio::test]
async fn test_time_range_spans_both_stores() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let point = numeric_point(1);
    source
        .save_point_values(point.series_id, &[numeric(100, 1.0)])
        .await
        .unwrap();
    destination
        .save_point_values(point.series_id, &[numeric(5_000, 2.0)])
        .await
        .unwrap();

    let engine = MigrationEngine::new(
        MigrationConfig::new(),
        source,
        destination,
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        Arc::new(MemoryProgressStore::new()),
    )
    .build();

    assert_eq!(
        engine.time_range(point.series_id).await.unwrap(),
        Some((100, 5_000))
    );
}
