//! CSV run storage with clean feature flag handling.
//!
//! File layout, one file per run (`run_00042_gate_map_test.csv`):
//!
//! ```text
//! # {                              <- pretty JSON header: run id, start time,
//! #   "run_id": { ... },              schema and metadata
//! #   ...
//! # }
//! direction,outer_index,inner_index,smub_volt,smua_volt,mf1_demod0_sample_x,...
//! forward,0,0,-1,-2,0.00001,...
//! ...
//! # status=completed
//! ```
//!
//! Every row is flushed as soon as it is written, so a run that was aborted (or
//! whose process died) can still be loaded.

use crate::{
    data::{Dataset, DatasetSchema, Recorder, RunId, RunStatus, SweepPoint},
    error::{AppResult, DaqError},
    metadata::Metadata,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

// ============================================================================
// CSV Recorder
// ============================================================================

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use crate::data::Direction;
    use crate::instrument::Reading;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::fs::File;
    use std::io::Write;

    const FIXED_COLUMNS: usize = 5;

    #[derive(Serialize, Deserialize)]
    struct RunHeader {
        run_id: RunId,
        started: DateTime<Utc>,
        schema: DatasetSchema,
        metadata: Metadata,
    }

    struct CurrentRun {
        run_id: RunId,
        path: PathBuf,
        columns: usize,
        writer: csv::Writer<File>,
    }

    /// Writes each run to its own CSV file under a directory.
    pub struct CsvRecorder {
        dir: PathBuf,
        current: Option<CurrentRun>,
        last_path: Option<PathBuf>,
    }

    impl CsvRecorder {
        /// Recorder writing into `dir` (created on first run).
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            Self {
                dir: dir.into(),
                current: None,
                last_path: None,
            }
        }

        /// File of the run in progress, or of the last finished run.
        pub fn last_path(&self) -> Option<&Path> {
            self.current
                .as_ref()
                .map(|c| c.path.as_path())
                .or(self.last_path.as_deref())
        }
    }

    fn slug(name: &str) -> String {
        let slug: String = name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        if slug.is_empty() {
            "run".to_string()
        } else {
            slug
        }
    }

    fn run_number(file_name: &str) -> Option<u64> {
        let rest = file_name.strip_prefix("run_")?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    fn next_run_number(dir: &Path) -> AppResult<u64> {
        let mut highest = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(n) = entry.file_name().to_str().and_then(run_number) {
                highest = highest.max(n);
            }
        }
        Ok(highest + 1)
    }

    #[async_trait]
    impl Recorder for CsvRecorder {
        async fn begin(&mut self, schema: &DatasetSchema, metadata: &Metadata) -> AppResult<RunId> {
            if self.current.is_some() {
                return Err(DaqError::Storage("a run is already in progress".to_string()));
            }
            std::fs::create_dir_all(&self.dir)?;
            let run_id = RunId::new(next_run_number(&self.dir)?);
            let path = self.dir.join(format!(
                "run_{:05}_{}.csv",
                run_id.id,
                slug(&schema.measurement_name)
            ));

            let mut file = File::create(&path)?;
            let header = RunHeader {
                run_id,
                started: Utc::now(),
                schema: schema.clone(),
                metadata: metadata.clone(),
            };
            for line in serde_json::to_string_pretty(&header)?.lines() {
                writeln!(file, "# {line}")?;
            }

            let mut columns = vec![
                "direction".to_string(),
                "outer_index".to_string(),
                "inner_index".to_string(),
                schema.outer.name.clone(),
                schema.inner.name.clone(),
            ];
            columns.extend(schema.observable_columns());

            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(&columns)?;
            writer.flush()?;

            tracing::info!(run = %run_id, path = %path.display(), "CSV run opened");
            self.current = Some(CurrentRun {
                run_id,
                path,
                columns: columns.len(),
                writer,
            });
            Ok(run_id)
        }

        async fn record(&mut self, point: &SweepPoint) -> AppResult<()> {
            let current = self
                .current
                .as_mut()
                .ok_or_else(|| DaqError::Storage("no run in progress".to_string()))?;

            let mut row = Vec::with_capacity(current.columns);
            row.push(point.direction.as_str().to_string());
            row.push(point.outer_index.to_string());
            row.push(point.inner_index.to_string());
            row.push(point.outer.to_string());
            row.push(point.inner.to_string());
            for reading in &point.readings {
                row.extend(reading.columns().iter().map(f64::to_string));
            }
            if row.len() != current.columns {
                return Err(DaqError::Storage(format!(
                    "run {}: point has {} columns, expected {}",
                    current.run_id,
                    row.len(),
                    current.columns
                )));
            }

            current.writer.write_record(&row)?;
            current.writer.flush()?;
            Ok(())
        }

        async fn finish(&mut self, status: RunStatus) -> AppResult<()> {
            let current = self
                .current
                .take()
                .ok_or_else(|| DaqError::Storage("no run in progress".to_string()))?;
            let mut file = current.writer.into_inner().map_err(|err| {
                DaqError::Storage(format!(
                    "failed to flush {}: {}",
                    current.path.display(),
                    err.error()
                ))
            })?;
            writeln!(file, "# status={}", status.as_str())?;
            file.flush()?;

            tracing::info!(run = %current.run_id, status = status.as_str(), "CSV run closed");
            self.last_path = Some(current.path);
            Ok(())
        }
    }

    fn parse_field<T: std::str::FromStr>(record: &csv::StringRecord, index: usize) -> AppResult<T> {
        record
            .get(index)
            .and_then(|field| field.trim().parse().ok())
            .ok_or_else(|| {
                DaqError::Storage(format!(
                    "invalid field {index} in row {:?}",
                    record.position().map(csv::Position::line)
                ))
            })
    }

    /// Read a run written by [`CsvRecorder`] back into memory.
    pub fn load_csv_run(path: &Path) -> AppResult<Dataset> {
        let text = std::fs::read_to_string(path)?;

        let mut header_json = String::new();
        let mut status = RunStatus::Running;
        let mut in_header = true;
        for line in text.lines() {
            if let Some(label) = line.strip_prefix("# status=") {
                status = label.trim().parse()?;
            } else if let Some(json) = line.strip_prefix('#') {
                if in_header {
                    header_json.push_str(json.strip_prefix(' ').unwrap_or(json));
                    header_json.push('\n');
                }
            } else {
                in_header = false;
            }
        }
        let header: RunHeader = serde_json::from_str(&header_json)?;
        let schema = header.schema;

        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .from_reader(text.as_bytes());
        let expected_columns = FIXED_COLUMNS + schema.observable_columns().len();
        if reader.headers()?.len() != expected_columns {
            return Err(DaqError::Storage(format!(
                "{}: header has {} columns, expected {expected_columns}",
                path.display(),
                reader.headers()?.len()
            )));
        }

        let mut points = Vec::new();
        for record in reader.records() {
            let record = record?;
            let direction = match record.get(0) {
                Some("forward") => Direction::Forward,
                Some("retrace") => Direction::Retrace,
                other => {
                    return Err(DaqError::Storage(format!("unknown direction {other:?}")));
                }
            };
            let values = (FIXED_COLUMNS..record.len())
                .map(|i| parse_field::<f64>(&record, i))
                .collect::<AppResult<Vec<f64>>>()?;

            let mut readings = Vec::with_capacity(schema.observables.len());
            let mut offset = 0;
            for observable in &schema.observables {
                let width = observable.kind.column_suffixes().len();
                let slice = values.get(offset..offset + width).unwrap_or_default();
                let reading = Reading::from_columns(observable.kind, slice).ok_or_else(|| {
                    DaqError::Storage(format!("truncated reading for '{}'", observable.name))
                })?;
                readings.push(reading);
                offset += width;
            }

            points.push(SweepPoint {
                outer_index: parse_field(&record, 1)?,
                inner_index: parse_field(&record, 2)?,
                outer: parse_field(&record, 3)?,
                inner: parse_field(&record, 4)?,
                direction,
                readings,
            });
        }

        Ok(Dataset {
            run_id: header.run_id,
            schema,
            metadata: header.metadata,
            started: header.started,
            status,
            points,
        })
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;

    /// Placeholder when the `storage_csv` feature is off.
    pub struct CsvRecorder;

    impl CsvRecorder {
        /// Always succeeds; every operation then fails with `FeatureNotEnabled`.
        pub fn new(_dir: impl Into<PathBuf>) -> Self {
            Self
        }

        /// Always `None`.
        pub fn last_path(&self) -> Option<&Path> {
            None
        }
    }

    #[async_trait]
    impl Recorder for CsvRecorder {
        async fn begin(
            &mut self,
            _schema: &DatasetSchema,
            _metadata: &Metadata,
        ) -> AppResult<RunId> {
            Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
        }

        async fn record(&mut self, _point: &SweepPoint) -> AppResult<()> {
            Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
        }

        async fn finish(&mut self, _status: RunStatus) -> AppResult<()> {
            Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }

    /// Fails with `FeatureNotEnabled`.
    pub fn load_csv_run(_path: &Path) -> AppResult<Dataset> {
        Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::{load_csv_run, CsvRecorder};

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::{load_csv_run, CsvRecorder};
