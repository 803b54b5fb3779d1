//! Checkpoint persistence: interrupted runs resume, restarts start over.

use crate::common::{collect, numeric, numeric_point, FailMode, FlakyStore};
use point_value_migrator::catalog::StaticCatalog;
use point_value_migrator::clock::SimulatedClock;
use point_value_migrator::migration::progress::{
    FileProgressStore, MemoryProgressStore, MigrationProgressStore, ProgressRecord,
};
use point_value_migrator::migration::{MigrationConfig, MigrationEngine};
use point_value_migrator::store::memory::MemoryStore;
use point_value_migrator::store::{PointValueStore, TimeOrder};
use point_value_migrator::{MigrationPeriod, PointValue};
use std::sync::Arc;
use std::time::Duration;

const DAY: i64 = 86_400_000;

fn history() -> Vec<PointValue> {
    vec![
        numeric(10, 1.0),
        numeric(DAY + 10, 2.0),
        numeric(2 * DAY + 10, 3.0),
    ]
}

#[tokio::test]
async fn test_interrupted_run_resumes_from_checkpoint() {
    let source = Arc::new(MemoryStore::new());
    let inner = Arc::new(MemoryStore::new());
    let progress_dir = tempfile::TempDir::new().unwrap();
    let progress = Arc::new(FileProgressStore::open(progress_dir.path()).unwrap());
    let point = numeric_point(1);
    let now = 3 * DAY;

    source
        .save_point_values(point.series_id, &history())
        .await
        .unwrap();

    // First run: the destination dies after one chunk.
    let flaky = Arc::new(FlakyStore::new(inner.clone(), FailMode::AfterWrites(1)));
    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .with_migration_period(MigrationPeriod::OneDay)
            .with_max_attempts(1),
        source.clone(),
        flaky,
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        progress.clone(),
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

    let record = progress.get(point.series_id).await.unwrap().unwrap();
    assert_eq!(record.checkpoint, DAY);
    assert!(!record.completed);

    // Second run against the healthy destination, same progress directory:
    // picks up at the checkpoint and finishes the backlog.
    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .with_migration_period(MigrationPeriod::OneDay)
            .with_max_attempts(1),
        source,
        inner.clone(),
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        Arc::new(FileProgressStore::open(progress_dir.path()).unwrap()),
    )
    .with_clock(SimulatedClock::shared(now))
    .build();
    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();
    assert!(summary.all_succeeded());

    // Full fidelity, no duplicates across the two runs.
    let stream = inner
        .stream_point_values(point.series_id, 0, now, None, TimeOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(collect(stream).await, history());
    assert_eq!(inner.sample_count(), history().len());

    let record = progress.get(point.series_id).await.unwrap().unwrap();
    assert!(record.completed);
    assert_eq!(record.checkpoint, now);
}

#[tokio::test]
async fn test_completed_record_skips_the_point() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let progress = Arc::new(MemoryProgressStore::new());
    let point = numeric_point(1);
    let now = 2 * DAY;

    source
        .save_point_values(point.series_id, &[numeric(10, 1.0)])
        .await
        .unwrap();

    // Pretend an earlier run already finished this point.
    let mut record = ProgressRecord::new(point.series_id, now);
    record.completed = true;
    progress.save(record).await.unwrap();

    let engine = MigrationEngine::new(
        MigrationConfig::new(),
        source.clone(),
        destination.clone(),
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        progress.clone(),
    )
    .with_clock(SimulatedClock::shared(now))
    .build();
    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(summary.migrated_samples, 0);
    assert_eq!(destination.sample_count(), 0);
}

#[tokio::test]
async fn test_start_new_migration_discards_checkpoints() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let progress = Arc::new(MemoryProgressStore::new());
    let point = numeric_point(1);
    let now = 2 * DAY;

    source
        .save_point_values(point.series_id, &[numeric(10, 1.0)])
        .await
        .unwrap();

    let mut record = ProgressRecord::new(point.series_id, now);
    record.completed = true;
    progress.save(record).await.unwrap();

    let engine = MigrationEngine::new(
        MigrationConfig::new().with_start_new_migration(true),
        source,
        destination.clone(),
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        progress.clone(),
    )
    .with_clock(SimulatedClock::shared(now))
    .build();
    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();

    // The stale "completed" record was discarded and the data re-migrated.
    assert!(summary.all_succeeded());
    assert_eq!(summary.migrated_samples, 1);
    assert_eq!(destination.sample_count(), 1);
}
