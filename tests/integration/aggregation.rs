//! Downsampling on the way into the destination.

use crate::common::{collect, numeric, numeric_point};
use point_value_migrator::catalog::StaticCatalog;
use point_value_migrator::clock::SimulatedClock;
use point_value_migrator::migration::{AggregationConfig, MigrationConfig, MigrationEngine};
use point_value_migrator::migration::progress::MemoryProgressStore;
use point_value_migrator::store::memory::MemoryStore;
use point_value_migrator::store::{PointValueStore, TimeOrder};
use point_value_migrator::{DataPoint, DataType, DataValue, MigrationPeriod, PointValue, SeriesId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const MINUTE: i64 = 60_000;
const HOUR: i64 = 3_600_000;

fn aggregation(types: &[DataType]) -> AggregationConfig {
    AggregationConfig::new(
        MigrationPeriod::FifteenMinutes,
        types.iter().copied().collect::<HashSet<_>>(),
    )
}

#[tokio::test]
async fn test_numeric_point_collapses_to_one_record_per_period() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let point = numeric_point(1);

    // One sample per minute for two hours.
    let samples: Vec<PointValue> = (0..120).map(|m| numeric(m * MINUTE, m as f64)).collect();
    source
        .save_point_values(point.series_id, &samples)
        .await
        .unwrap();

    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .with_migration_period(MigrationPeriod::OneHour)
            .with_aggregation(aggregation(&[DataType::Numeric])),
        source,
        destination.clone(),
        Arc::new(StaticCatalog::new(vec![point.clone()])),
        Arc::new(MemoryProgressStore::new()),
    )
    .with_clock(SimulatedClock::shared(2 * HOUR))
    .build();

    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();
    assert!(summary.all_succeeded());
    assert_eq!(summary.migrated_samples, 120);

    // Eight 15-minute periods, one record each, at the period starts.
    let stream = destination
        .stream_point_values(point.series_id, 0, 2 * HOUR, None, TimeOrder::Ascending)
        .await
        .unwrap();
    let aggregates = collect(stream).await;
    assert_eq!(aggregates.len(), 8);
    for (i, aggregate) in aggregates.iter().enumerate() {
        let period_start = i as i64 * 15 * MINUTE;
        assert_eq!(aggregate.timestamp, period_start);
        // Period i averages minutes 15i..15i+14
        let expected = (15 * i + 7) as f64;
        assert_eq!(aggregate.value, DataValue::Numeric(expected));
        assert!(aggregate
            .annotation
            .as_deref()
            .unwrap()
            .contains("15 samples"));
    }
}

#[tokio::test]
async fn test_unconfigured_types_pass_through_raw() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let binary = DataPoint::new(SeriesId(2), "DP_2", "pump state", DataType::Binary);

    let samples: Vec<PointValue> = (0..30)
        .map(|m| PointValue::new(m * MINUTE, DataValue::Binary(m % 2 == 0)))
        .collect();
    source
        .save_point_values(binary.series_id, &samples)
        .await
        .unwrap();

    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .with_migration_period(MigrationPeriod::OneHour)
            .with_aggregation(aggregation(&[DataType::Numeric])),
        source,
        destination.clone(),
        Arc::new(StaticCatalog::new(vec![binary.clone()])),
        Arc::new(MemoryProgressStore::new()),
    )
    .with_clock(SimulatedClock::shared(HOUR))
    .build();

    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();
    assert!(summary.all_succeeded());

    // Binary is not in the aggregation set: every raw sample survives.
    let stream = destination
        .stream_point_values(binary.series_id, 0, HOUR, None, TimeOrder::Ascending)
        .await
        .unwrap();
    assert_eq!(collect(stream).await, samples);
}

#[tokio::test]
async fn test_conflicting_aggregation_excludes_the_point() {
    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let text = DataPoint::new(SeriesId(3), "DP_3", "status text", DataType::Alphanumeric);
    let numeric_pt = numeric_point(4);

    source
        .save_point_values(
            text.series_id,
            &[PointValue::new(0, DataValue::Alphanumeric("ok".into()))],
        )
        .await
        .unwrap();
    source
        .save_point_values(numeric_pt.series_id, &[numeric(0, 1.0)])
        .await
        .unwrap();

    // Aggregation requested for a type that has no numeric statistics: the
    // text point is excluded at selection time, not failed mid-run.
    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .with_migration_period(MigrationPeriod::OneHour)
            .with_aggregation(aggregation(&[DataType::Alphanumeric, DataType::Numeric])),
        source,
        destination.clone(),
        Arc::new(StaticCatalog::new(vec![text.clone(), numeric_pt.clone()])),
        Arc::new(MemoryProgressStore::new()),
    )
    .with_clock(SimulatedClock::shared(HOUR))
    .build();

    engine.start().unwrap();
    let summary = engine
        .wait_finished_timeout(Duration::from_secs(30))
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(summary.completed, vec![numeric_pt.series_id]);
    assert!(destination
        .get_point_value_at(text.series_id, 0)
        .await
        .unwrap()
        .is_none());
}
