//! Chunk retry semantics: transient failures recover, exhausted budgets
//! fail the point without touching the others.

use crate::common::{numeric, numeric_point, FailMode, FlakyStore};
use point_value_migrator::catalog::StaticCatalog;
use point_value_migrator::clock::SimulatedClock;
use point_value_migrator::migration::progress::{MemoryProgressStore, MigrationProgressStore};
use point_value_migrator::migration::{MigrationConfig, MigrationEngine};
use point_value_migrator::store::memory::MemoryStore;
use point_value_migrator::store::PointValueStore;
use point_value_migrator::{DataValue, MigrationPeriod, SeriesId};
use std::sync::Arc;
use std::time::Duration;

const HOUR: i64 = 3_600_000;

#[tokio::test]
async fn test_transient_failures_recover_within_budget() {
    let source = Arc::new(MemoryStore::new());
    let inner = Arc::new(MemoryStore::new());
    // Two injected write failures, then healthy: with max_attempts=3 the
    // chunk must land on the third attempt.
    let destination = Arc::new(FlakyStore::new(inner.clone(), FailMode::FirstWrites(2)));
    let progress = Arc::new(MemoryProgressStore::new());
    let point = numeric_point(1);

    source
        .save_point_values(point.series_id, &[numeric(100, 1.5)])
        .await
        .unwrap();

    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .with_migration_period(MigrationPeriod::OneHour)
            .with_max_attempts(3),
        source,
        destination.clone(),
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        progress.clone(),
    )
    .with_clock(SimulatedClock::shared(HOUR))
    .build();

    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();

    assert!(summary.all_succeeded(), "failed: {:?}", summary.failed);
    assert_eq!(destination.write_calls(), 3);

    // The retried chunk did not double-write and the checkpoint advanced
    // exactly once, to the window's upper bound.
    assert_eq!(inner.sample_count(), 1);
    let value = inner
        .get_point_value_at(point.series_id, 100)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value.value, DataValue::Numeric(1.5));

    let record = progress.get(point.series_id).await.unwrap().unwrap();
    assert!(record.completed);
    assert_eq!(record.checkpoint, HOUR);
    assert_eq!(record.failures, 2);
}

#[tokio::test]
async fn test_exhausted_budget_fails_only_that_point() {
    let source = Arc::new(MemoryStore::new());
    let inner = Arc::new(MemoryStore::new());
    let broken = numeric_point(1);
    let healthy = numeric_point(2);
    // Every write for series 1 fails; series 2 is untouched.
    let destination = Arc::new(FlakyStore::for_series(
        inner.clone(),
        FailMode::AfterWrites(0),
        broken.series_id,
    ));
    let progress = Arc::new(MemoryProgressStore::new());

    for point in [&broken, &healthy] {
        source
            .save_point_values(point.series_id, &[numeric(100, 1.0)])
            .await
            .unwrap();
    }

    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .with_migration_period(MigrationPeriod::OneHour)
            .with_max_attempts(1),
        source,
        destination,
        Arc::new(StaticCatalog::new(vec![broken.clone(), healthy.clone()])),
        progress.clone(),
    )
    .with_clock(SimulatedClock::shared(HOUR))
    .build();

    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();

    assert!(!summary.all_succeeded());
    assert_eq!(summary.completed, vec![healthy.series_id]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].series_id, broken.series_id);
    assert!(summary.failed[0].error.contains("injected write failure"));

    // The healthy point's data landed; the broken point keeps no checkpoint
    // past its failure and stays resumable.
    assert_eq!(inner.sample_count(), 1);
    let record = progress.get(SeriesId(1)).await.unwrap();
    assert!(record.map(|r| !r.completed).unwrap_or(true));
}
