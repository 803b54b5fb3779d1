//! CSV-file-backed point value store.
//!
//! One CSV file per series inside a directory (`series_<id>.csv`), rows
//! ordered by timestamp. Rewrites go through a temp file and an atomic rename
//! so a crash mid-write never leaves a truncated series file behind.
//!
//! This backend trades write throughput for a dead-simple on-disk format you
//! can inspect and diff; it is the store the CLI wires up on both ends of a
//! migration.

use super::{PointValueStore, PointValueStream, StoreError, StoreResult, TimeOrder};
use crate::{DataPoint, DataType, DataValue, PointValue, SeriesId};
use async_trait::async_trait;
use csv::{ReaderBuilder, Writer};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// CSV row for one sample.
#[derive(Debug, Serialize, Deserialize)]
struct SampleRecord {
    timestamp: i64,
    kind: String,
    value: String,
    #[serde(default)]
    annotation: String,
}

impl SampleRecord {
    fn from_point_value(value: &PointValue) -> Self {
        let (kind, rendered) = match &value.value {
            DataValue::Numeric(v) => ("numeric", v.to_string()),
            DataValue::Binary(v) => ("binary", v.to_string()),
            DataValue::Multistate(v) => ("multistate", v.to_string()),
            DataValue::Alphanumeric(v) => ("alphanumeric", v.clone()),
        };
        Self {
            timestamp: value.timestamp,
            kind: kind.to_string(),
            value: rendered,
            annotation: value.annotation.clone().unwrap_or_default(),
        }
    }

    fn into_point_value(self) -> StoreResult<PointValue> {
        let kind = DataType::from_str(&self.kind).map_err(StoreError::InvalidRecord)?;
        let value = match kind {
            DataType::Numeric => DataValue::Numeric(self.value.parse().map_err(|_| {
                StoreError::InvalidRecord(format!("bad numeric value: {}", self.value))
            })?),
            DataType::Binary => DataValue::Binary(self.value.parse().map_err(|_| {
                StoreError::InvalidRecord(format!("bad binary value: {}", self.value))
            })?),
            DataType::Multistate => DataValue::Multistate(self.value.parse().map_err(|_| {
                StoreError::InvalidRecord(format!("bad multistate value: {}", self.value))
            })?),
            DataType::Alphanumeric => DataValue::Alphanumeric(self.value),
        };
        let annotation = if self.annotation.is_empty() {
            None
        } else {
            Some(self.annotation)
        };
        Ok(PointValue {
            timestamp: self.timestamp,
            value,
            annotation,
        })
    }
}

/// File-per-series CSV store rooted at a directory.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    /// Open (creating if needed) a CSV store rooted at `dir`.
    pub fn open<P: Into<PathBuf>>(dir: P) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| StoreError::IoError(format!("Failed to create store dir: {e}")))?;
        info!(dir = %dir.display(), "Opened CSV point value store");
        Ok(Self { dir })
    }

    /// Directory this store reads and writes.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn series_path(&self, series: SeriesId) -> PathBuf {
        self.dir.join(format!("series_{series}.csv"))
    }

    fn load_series(&self, series: SeriesId) -> StoreResult<BTreeMap<i64, PointValue>> {
        let path = self.series_path(series);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|e| StoreError::CsvError(format!("Failed to open {}: {e}", path.display())))?;

        let mut samples = BTreeMap::new();
        for row in reader.deserialize::<SampleRecord>() {
            let record = row.map_err(|e| StoreError::CsvError(format!("Failed to read row: {e}")))?;
            let value = record.into_point_value()?;
            samples.insert(value.timestamp, value);
        }
        Ok(samples)
    }

    fn write_series(&self, series: SeriesId, samples: &BTreeMap<i64, PointValue>) -> StoreResult<()> {
        let path = self.series_path(series);
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| StoreError::IoError(format!("Failed to create temp file: {e}")))?;

        {
            let buf = BufWriter::new(&mut temp);
            let mut writer = Writer::from_writer(buf);
            for value in samples.values() {
                writer
                    .serialize(SampleRecord::from_point_value(value))
                    .map_err(|e| StoreError::CsvError(format!("Failed to write row: {e}")))?;
            }
            writer
                .flush()
                .map_err(|e| StoreError::IoError(format!("Failed to flush: {e}")))?;
        }

        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp.persist(&path)
            .map_err(|e| StoreError::IoError(format!("Failed to persist temp file: {e}")))?;

        debug!(
            path = %path.display(),
            samples = samples.len(),
            "Series file rewritten"
        );
        Ok(())
    }

    /// Enumerate the data points present in this store's directory.
    ///
    /// Series identity comes from the file name; the data type comes from the
    /// first row of the file. Empty files are skipped.
    pub fn discover_points(&self) -> StoreResult<Vec<DataPoint>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| StoreError::IoError(format!("Failed to read store dir: {e}")))?;

        let mut points = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::IoError(e.to_string()))?;
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !path.extension().is_some_and(|ext| ext == "csv") {
                continue;
            }
            let Some(id) = stem
                .strip_prefix("series_")
                .and_then(|id| id.parse::<i32>().ok())
            else {
                debug!(file = %path.display(), "Skipping non-series file");
                continue;
            };

            let series = SeriesId(id);
            let samples = self.load_series(series)?;
            let Some(first) = samples.values().next() else {
                continue;
            };
            points.push(DataPoint::new(
                series,
                format!("DP_{id}"),
                stem.to_string(),
                first.value.data_type(),
            ));
        }
        points.sort_by_key(|p| p.series_id);
        Ok(points)
    }
}

#[async_trait]
impl PointValueStore for CsvStore {
    async fn save_point_values(&self, series: SeriesId, values: &[PointValue]) -> StoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut samples = self.load_series(series)?;
        for value in values {
            samples.insert(value.timestamp, value.clone());
        }
        self.write_series(series, &samples)
    }

    async fn stream_point_values(
        &self,
        series: SeriesId,
        from: i64,
        to: i64,
        limit: Option<usize>,
        order: TimeOrder,
    ) -> StoreResult<PointValueStream> {
        let samples = self.load_series(series)?;
        let cap = limit.unwrap_or(usize::MAX);
        let values: Vec<PointValue> = match order {
            TimeOrder::Ascending => samples
                .range(from..to)
                .take(cap)
                .map(|(_, v)| v.clone())
                .collect(),
            TimeOrder::Descending => samples
                .range(from..to)
                .rev()
                .take(cap)
                .map(|(_, v)| v.clone())
                .collect(),
        };
        Ok(Box::pin(stream::iter(values.into_iter().map(Ok))))
    }

    async fn get_point_value_at(
        &self,
        series: SeriesId,
        timestamp: i64,
    ) -> StoreResult<Option<PointValue>> {
        let samples = self.load_series(series)?;
        Ok(samples.get(&timestamp).cloned())
    }

    async fn time_range(&self, series: SeriesId) -> StoreResult<Option<(i64, i64)>> {
        let samples = self.load_series(series)?;
        let first = samples.keys().next().copied();
        let last = samples.keys().next_back().copied();
        Ok(first.zip(last))
    }
}
