//! # Point Value Migrator Library
//!
//! A library for migrating historical time-series point values from one
//! storage backend to another while a live system keeps writing new samples
//! to the destination. Built for SCADA/IoT history stores where a backend
//! swap must not lose, duplicate, or reorder a single sample.
//!
//! ## Features
//!
//! - **Chunked copying**: history is copied in bounded time windows so a
//!   series of any size migrates with flat memory usage
//! - **Resume Capability**: per-point checkpoints persist after every chunk;
//!   a restart continues exactly where the previous run stopped
//! - **Transparent reads**: the engine is itself a [`store::PointValueStore`]
//!   and stitches reads across source and destination with no gaps and no
//!   duplicates, whatever the migration state of the point
//! - **Optional downsampling**: numeric series can be aggregated into
//!   per-period statistics on the way into the destination
//! - **Failure isolation**: one series failing its retry budget never stops
//!   the others
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use point_value_migrator::catalog::StaticCatalog;
//! use point_value_migrator::migration::{MigrationConfig, MigrationEngine};
//! use point_value_migrator::migration::progress::MemoryProgressStore;
//! use point_value_migrator::store::memory::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(MemoryStore::new());
//! let destination = Arc::new(MemoryStore::new());
//! let catalog = Arc::new(StaticCatalog::new(vec![]));
//! let progress = Arc::new(MemoryProgressStore::new());
//!
//! let engine = MigrationEngine::new(
//!     MigrationConfig::new().with_worker_count(4),
//!     source,
//!     destination,
//!     catalog,
//!     progress,
//! )
//! .build();
//!
//! engine.start()?;
//! let summary = engine.wait_finished().await?;
//! assert!(summary.all_succeeded());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`store`] - The point-value storage seam: trait, in-memory and CSV backends
//! - [`catalog`] - Enumeration of candidate data points
//! - [`migration`] - The migration engine: config, progress checkpoints,
//!   chunk windows, aggregation, per-point workers, and the orchestrating facade
//! - [`clock`] - Swappable time source so window boundaries are deterministic in tests
//! - [`shutdown`] - Graceful-shutdown coordination shared across tasks
//! - [`metrics`] - Prometheus-exportable counters for migration health

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Candidate data point enumeration
pub mod catalog;

/// Time source abstraction
pub mod clock;

/// CLI command implementations
pub mod cli;

/// Migration observability metrics
pub mod metrics;

/// Migration engine
pub mod migration;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Point value storage backends
pub mod store;

// Re-export commonly used types
pub use migration::{MigrationConfig, MigrationEngine};

/// Identity of one time series within a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesId(
    /// Backend series number
    pub i32,
);

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of samples a data point produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Floating-point samples
    #[serde(rename = "numeric")]
    Numeric,
    /// Boolean samples
    #[serde(rename = "binary")]
    Binary,
    /// Integer state samples
    #[serde(rename = "multistate")]
    Multistate,
    /// Free-text samples
    #[serde(rename = "alphanumeric")]
    Alphanumeric,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Numeric => "numeric",
            DataType::Binary => "binary",
            DataType::Multistate => "multistate",
            DataType::Alphanumeric => "alphanumeric",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numeric" => Ok(DataType::Numeric),
            "binary" => Ok(DataType::Binary),
            "multistate" => Ok(DataType::Multistate),
            "alphanumeric" => Ok(DataType::Alphanumeric),
            _ => Err(format!("Invalid data type: {s}")),
        }
    }
}

/// A single sample value, tagged with its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DataValue {
    /// Floating-point sample
    Numeric(f64),
    /// Boolean sample
    Binary(bool),
    /// Integer state sample
    Multistate(i64),
    /// Free-text sample
    Alphanumeric(String),
}

impl DataValue {
    /// The [`DataType`] this value belongs to.
    pub fn data_type(&self) -> DataType {
        match self {
            DataValue::Numeric(_) => DataType::Numeric,
            DataValue::Binary(_) => DataType::Binary,
            DataValue::Multistate(_) => DataType::Multistate,
            DataValue::Alphanumeric(_) => DataType::Alphanumeric,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Numeric(v) => Some(*v),
            DataValue::Multistate(v) => Some(*v as f64),
            DataValue::Binary(v) => Some(if *v { 1.0 } else { 0.0 }),
            DataValue::Alphanumeric(_) => None,
        }
    }
}

/// A timestamped sample, the unit copied from source to destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointValue {
    /// Sample time (Unix timestamp in milliseconds)
    pub timestamp: i64,
    /// Sample value
    pub value: DataValue,
    /// Optional free-text annotation attached to the sample
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub annotation: Option<String>,
}

impl PointValue {
    /// Create an unannotated point value.
    pub fn new(timestamp: i64, value: DataValue) -> Self {
        Self {
            timestamp,
            value,
            annotation: None,
        }
    }

    /// Create an annotated point value.
    pub fn annotated(timestamp: i64, value: DataValue, annotation: impl Into<String>) -> Self {
        Self {
            timestamp,
            value,
            annotation: Some(annotation.into()),
        }
    }
}

/// A data point: the identity and shape of one time series.
///
/// Migration treats a point as an opaque unit of work; everything it needs
/// is the series identity and the data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Series identity in the storage backends
    pub series_id: SeriesId,
    /// External identifier (stable across exports)
    pub xid: String,
    /// Human-readable name
    pub name: String,
    /// Type of samples this point produces
    pub data_type: DataType,
}

impl DataPoint {
    /// Create a data point.
    pub fn new(
        series_id: SeriesId,
        xid: impl Into<String>,
        name: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            series_id,
            xid: xid.into(),
            name: name.into(),
            data_type,
        }
    }

    /// Validate point metadata integrity.
    pub fn validate(&self) -> Result<(), String> {
        if self.xid.is_empty() {
            return Err("XID cannot be empty".to_string());
        }
        if self.name.is_empty() {
            return Err("Name cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Time span of one migration chunk or aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationPeriod {
    /// 15 minutes
    #[serde(rename = "15m")]
    FifteenMinutes,
    /// 30 minutes
    #[serde(rename = "30m")]
    ThirtyMinutes,
    /// 1 hour
    #[serde(rename = "1h")]
    OneHour,
    /// 4 hours
    #[serde(rename = "4h")]
    FourHours,
    /// 12 hours
    #[serde(rename = "12h")]
    TwelveHours,
    /// 1 day
    #[serde(rename = "1d")]
    OneDay,
    /// 1 week
    #[serde(rename = "1w")]
    OneWeek,
    /// 1 month (30 days)
    #[serde(rename = "1M")]
    OneMonth,
}

impl MigrationPeriod {
    /// Convert period to milliseconds.
    pub fn to_milliseconds(&self) -> i64 {
        match self {
            MigrationPeriod::FifteenMinutes => 900_000,
            MigrationPeriod::ThirtyMinutes => 1_800_000,
            MigrationPeriod::OneHour => 3_600_000,
            MigrationPeriod::FourHours => 14_400_000,
            MigrationPeriod::TwelveHours => 43_200_000,
            MigrationPeriod::OneDay => 86_400_000,
            MigrationPeriod::OneWeek => 604_800_000,
            MigrationPeriod::OneMonth => 2_592_000_000, // Approximate: 30 days
        }
    }
}

impl std::fmt::Display for MigrationPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MigrationPeriod::FifteenMinutes => "15m",
            MigrationPeriod::ThirtyMinutes => "30m",
            MigrationPeriod::OneHour => "1h",
            MigrationPeriod::FourHours => "4h",
            MigrationPeriod::TwelveHours => "12h",
            MigrationPeriod::OneDay => "1d",
            MigrationPeriod::OneWeek => "1w",
            MigrationPeriod::OneMonth => "1M",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MigrationPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15m" => Ok(MigrationPeriod::FifteenMinutes),
            "30m" => Ok(MigrationPeriod::ThirtyMinutes),
            "1h" => Ok(MigrationPeriod::OneHour),
            "4h" => Ok(MigrationPeriod::FourHours),
            "12h" => Ok(MigrationPeriod::TwelveHours),
            "1d" => Ok(MigrationPeriod::OneDay),
            "1w" => Ok(MigrationPeriod::OneWeek),
            "1M" => Ok(MigrationPeriod::OneMonth),
            _ => Err(format!("Invalid migration period: {s}")),
        }
    }
}
