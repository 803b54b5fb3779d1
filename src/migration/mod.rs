//! Migration engine.
//!
//! This module drives the copy of historical point values from a source store
//! into a destination store while the surrounding system keeps using both
//! through the engine's own [`crate::store::PointValueStore`] facade.
//!
//! # Overview
//!
//! 1. **Configuration**: describe the run with [`config::MigrationConfig`]
//! 2. **Selection**: enumerate catalog points and apply the configured filter
//! 3. **Execution**: one [`worker`] job per point, fanned out across a
//!    bounded worker pool; each job copies chunk windows in ascending time
//!    order with retry and backoff
//! 4. **Checkpointing**: every successful chunk persists a
//!    [`progress::ProgressRecord`] so a restart resumes where it stopped
//! 5. **Completion**: [`engine::MigrationEngine::wait_finished`] yields a
//!    [`engine::MigrationSummary`] distinguishing completed, failed, and
//!    cancelled points
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use point_value_migrator::catalog::StaticCatalog;
//! use point_value_migrator::migration::{MigrationConfig, MigrationEngine};
//! use point_value_migrator::migration::progress::MemoryProgressStore;
//! use point_value_migrator::store::memory::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = MigrationEngine::new(
//!     MigrationConfig::new(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(StaticCatalog::new(vec![])),
//!     Arc::new(MemoryProgressStore::new()),
//! )
//! .build();
//! engine.start()?;
//! let summary = engine.wait_finished().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Chunk-level failures are retried and, once the attempt budget is spent,
//! isolated to the owning point: they surface in the summary, never as a
//! panic or an abort of the other jobs. Engine-level misuse (double start,
//! waiting before start) returns a [`MigrationError`] immediately.

pub mod aggregate;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod progress;
pub mod worker;

pub use config::{AggregationConfig, MigrationConfig, PointFilter};
pub use engine::{EngineSnapshot, FailedPoint, MigrationEngine, MigrationSummary};
pub use worker::{PointProgress, PointStatus};

use crate::store::StoreError;
use progress::ProgressError;

/// Engine-level migration errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// `start()` was called while a migration is already running or finished
    #[error("migration already started")]
    AlreadyRunning,

    /// A wait was issued before `start()`
    #[error("migration has not been started")]
    NotStarted,

    /// The migration driver terminated without producing a summary
    #[error("migration aborted: {0}")]
    Aborted(String),

    /// A bounded wait elapsed while jobs were still running
    #[error("timed out after {0:?} waiting for migration to finish")]
    WaitTimeout(std::time::Duration),

    /// Storage error surfaced through the facade
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Progress store error surfaced through the facade
    #[error("progress error: {0}")]
    Progress(#[from] ProgressError),
}
