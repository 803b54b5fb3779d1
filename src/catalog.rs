//! Candidate data point enumeration.
//!
//! The engine asks a [`DataPointCatalog`] which points exist; the configured
//! filter then narrows that set down to the points that actually migrate.

use crate::store::csv::CsvStore;
use crate::store::StoreResult;
use crate::DataPoint;
use async_trait::async_trait;

/// Enumerates the data points a migration may cover.
#[async_trait]
pub trait DataPointCatalog: Send + Sync {
    /// All known data points.
    async fn list_points(&self) -> StoreResult<Vec<DataPoint>>;
}

/// Fixed, in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    points: Vec<DataPoint>,
}

impl StaticCatalog {
    /// Create a catalog over a fixed point list.
    pub fn new(points: Vec<DataPoint>) -> Self {
        Self { points }
    }
}

#[async_trait]
impl DataPointCatalog for StaticCatalog {
    async fn list_points(&self) -> StoreResult<Vec<DataPoint>> {
        Ok(self.points.clone())
    }
}

#[async_trait]
impl DataPointCatalog for CsvStore {
    async fn list_points(&self) -> StoreResult<Vec<DataPoint>> {
        self.discover_points()
    }
}
