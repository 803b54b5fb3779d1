//! Durable per-point migration checkpoints.
//!
//! One [`ProgressRecord`] per data point records how far migration has
//! advanced. Records are created lazily when a point's migration first
//! begins, mutated after each chunk, and never deleted automatically — a
//! restart resumes from the last persisted checkpoint instead of
//! re-migrating from scratch.

use crate::SeriesId;
use async_trait::async_trait;
use fd_lock::RwLock as FdRwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Per-point persisted migration state.
///
/// `checkpoint` is the exclusive upper bound of the migrated range: every
/// sample with `timestamp < checkpoint` has been copied to the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Series this record tracks
    pub series_id: SeriesId,
    /// Exclusive upper bound of the migrated range (Unix milliseconds)
    pub checkpoint: i64,
    /// Chunk attempts made so far, including retries
    pub attempts: u64,
    /// Failed chunk attempts so far
    pub failures: u64,
    /// Whether the point's backlog is fully migrated
    pub completed: bool,
    /// When this record was last written (Unix milliseconds)
    pub updated_at: i64,
}

impl ProgressRecord {
    /// Create a fresh record at the given checkpoint.
    pub fn new(series_id: SeriesId, checkpoint: i64) -> Self {
        Self {
            series_id,
            checkpoint,
            attempts: 0,
            failures: 0,
            completed: false,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Merge this record onto the previously stored one.
    ///
    /// The checkpoint never regresses: a save carrying an older timestamp
    /// than the stored record keeps the stored checkpoint (and its completed
    /// flag), so out-of-order saves under concurrent retries cannot undo
    /// progress.
    pub fn absorb(mut self, existing: &ProgressRecord) -> ProgressRecord {
        if existing.checkpoint > self.checkpoint {
            self.checkpoint = existing.checkpoint;
            self.completed = self.completed || existing.completed;
        }
        self
    }
}

/// Progress store errors
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// File lock error
    #[error("lock error: {0}")]
    LockError(String),
}

/// Durable checkpoint storage keyed by data point.
#[async_trait]
pub trait MigrationProgressStore: Send + Sync {
    /// The stored record for a series; `None` means its migration has not
    /// yet begun.
    async fn get(&self, series: SeriesId) -> Result<Option<ProgressRecord>, ProgressError>;

    /// Persist a record. Must be idempotent and must not regress the stored
    /// checkpoint (see [`ProgressRecord::absorb`]).
    async fn save(&self, record: ProgressRecord) -> Result<(), ProgressError>;

    /// Remove the stored record for a series, if any.
    async fn clear(&self, series: SeriesId) -> Result<(), ProgressError>;

    /// All stored records.
    async fn all(&self) -> Result<Vec<ProgressRecord>, ProgressError>;
}

/// In-memory progress store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: RwLock<HashMap<SeriesId, ProgressRecord>>,
}

impl MemoryProgressStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MigrationProgressStore for MemoryProgressStore {
    async fn get(&self, series: SeriesId) -> Result<Option<ProgressRecord>, ProgressError> {
        Ok(self.records.read().unwrap().get(&series).cloned())
    }

    async fn save(&self, record: ProgressRecord) -> Result<(), ProgressError> {
        let mut records = self.records.write().unwrap();
        let effective = match records.get(&record.series_id) {
            Some(existing) => record.absorb(existing),
            None => record,
        };
        records.insert(effective.series_id, effective);
        Ok(())
    }

    async fn clear(&self, series: SeriesId) -> Result<(), ProgressError> {
        self.records.write().unwrap().remove(&series);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ProgressRecord>, ProgressError> {
        let mut records: Vec<ProgressRecord> =
            self.records.read().unwrap().values().cloned().collect();
        records.sort_by_key(|r| r.series_id);
        Ok(records)
    }
}

/// File-backed progress store: one JSON file per data point.
///
/// Writes go through a temp file and an atomic rename, coordinated by an
/// `fd-lock` lock file, so concurrent workers and a crashed process can
/// never leave a record half-written.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    /// Open (creating if needed) a progress store rooted at `dir`.
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self, ProgressError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ProgressError::IoError(format!("Failed to create progress dir: {e}")))?;
        Ok(Self { dir })
    }

    fn record_path(&self, series: SeriesId) -> PathBuf {
        self.dir.join(format!("point_{series}.json"))
    }

    fn lock_path(&self, series: SeriesId) -> PathBuf {
        self.dir.join(format!("point_{series}.lock"))
    }

    fn open_lock(&self, series: SeriesId) -> Result<FdRwLock<std::fs::File>, ProgressError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path(series))
            .map_err(|e| ProgressError::LockError(format!("Failed to create lock file: {e}")))?;
        Ok(FdRwLock::new(file))
    }

    fn read_record(&self, path: &Path) -> Result<Option<ProgressRecord>, ProgressError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProgressError::IoError(e.to_string()))?;
        let record = serde_json::from_str(&contents).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to deserialize progress record");
            ProgressError::DeserializationError(e.to_string())
        })?;
        Ok(Some(record))
    }
}

#[async_trait]
impl MigrationProgressStore for FileProgressStore {
    async fn get(&self, series: SeriesId) -> Result<Option<ProgressRecord>, ProgressError> {
        let mut lock = self.open_lock(series)?;
        let _guard = lock
            .read()
            .map_err(|e| ProgressError::LockError(format!("Failed to acquire read lock: {e}")))?;
        self.read_record(&self.record_path(series))
    }

    async fn save(&self, record: ProgressRecord) -> Result<(), ProgressError> {
        let series = record.series_id;
        let mut lock = self.open_lock(series)?;
        let _guard = lock
            .write()
            .map_err(|e| ProgressError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let path = self.record_path(series);
        let effective = match self.read_record(&path)? {
            Some(existing) => record.absorb(&existing),
            None => record,
        };

        let json = serde_json::to_string_pretty(&effective)
            .map_err(|e| ProgressError::SerializationError(e.to_string()))?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| ProgressError::IoError(format!("Failed to create temp file: {e}")))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| ProgressError::IoError(format!("Failed to write temp file: {e}")))?;
        temp.flush()
            .map_err(|e| ProgressError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ProgressError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp.persist(&path)
            .map_err(|e| ProgressError::IoError(format!("Failed to persist temp file: {e}")))?;

        debug!(
            series = %series,
            checkpoint = effective.checkpoint,
            completed = effective.completed,
            "Progress record saved"
        );
        Ok(())
    }

    async fn clear(&self, series: SeriesId) -> Result<(), ProgressError> {
        let mut lock = self.open_lock(series)?;
        let _guard = lock
            .write()
            .map_err(|e| ProgressError::LockError(format!("Failed to acquire write lock: {e}")))?;
        let path = self.record_path(series);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| ProgressError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ProgressRecord>, ProgressError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| ProgressError::IoError(format!("Failed to read progress dir: {e}")))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ProgressError::IoError(e.to_string()))?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            if let Some(record) = self.read_record(&path)? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.series_id);
        Ok(records)
    }
}
