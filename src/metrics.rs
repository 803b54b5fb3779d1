//! Production observability metrics for the migration engine.
//!
//! Counters are emitted through the `metrics` facade; installing the
//! Prometheus exporter is opt-in (the CLI does it when given a listen
//! address). Without an installed recorder every emission is a no-op, so the
//! engine can always record unconditionally.

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing::info;

static METRICS_INSTALLED: OnceCell<()> = OnceCell::new();

/// Initialize the metrics system with a Prometheus scrape endpoint.
///
/// Idempotent: only the first call installs the exporter.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INSTALLED.get().is_some() {
        return Ok(());
    }

    info!(%addr, "Installing Prometheus metrics exporter");
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "migration_points_completed_total",
        Unit::Count,
        "Data points whose backlog migrated to completion"
    );
    describe_counter!(
        "migration_points_failed_total",
        Unit::Count,
        "Data points that exhausted their chunk retry budget"
    );
    describe_counter!(
        "migration_samples_migrated_total",
        Unit::Count,
        "Point values copied from source to destination"
    );
    describe_counter!(
        "migration_chunk_retries_total",
        Unit::Count,
        "Chunk attempts that failed and were retried"
    );
    describe_gauge!(
        "migration_points_in_progress",
        Unit::Count,
        "Data points currently walking their backlog"
    );

    let _ = METRICS_INSTALLED.set(());
    Ok(())
}

/// Record a fully migrated point and the samples it contributed.
pub fn record_point_migrated(samples: u64) {
    counter!("migration_points_completed_total").increment(1);
    counter!("migration_samples_migrated_total").increment(samples);
}

/// Record a point that exhausted its retry budget.
pub fn record_point_failed() {
    counter!("migration_points_failed_total").increment(1);
}

/// Record a failed chunk attempt that will be retried.
pub fn record_chunk_retry() {
    counter!("migration_chunk_retries_total").increment(1);
}

/// Publish the current number of in-flight point jobs.
pub fn set_points_in_progress(count: usize) {
    gauge!("migration_points_in_progress").set(count as f64);
}
