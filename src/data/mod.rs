//! Recording collaborators and the dataset model.
//!
//! A sweep hands each [`SweepPoint`] to a [`Recorder`] as soon as it is measured.
//! Recorders own persistence; the sweep keeps no buffer. Two recorders ship with
//! the crate:
//!
//! - [`MemoryRecorder`]: keeps datasets in memory (tests, analysis pipelines).
//! - [`CsvRecorder`]: one CSV file per run with a JSON metadata header
//!   (feature `storage_csv`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppResult;
use crate::instrument::{ObservableKind, Reading};
use crate::metadata::Metadata;

pub mod memory;
pub mod storage;

pub use memory::MemoryRecorder;
pub use storage::{load_csv_run, CsvRecorder};

/// Identity of a recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    /// Sequential run number within a recorder's store.
    pub id: u64,
    /// Globally unique identifier.
    pub guid: Uuid,
}

impl RunId {
    /// New run id with a fresh GUID.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            guid: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Still recording, or the process died before finishing.
    Running,
    /// Every planned point was recorded.
    Completed,
    /// Stopped by a failure; the recorded points are a valid partial dataset.
    Aborted,
}

impl RunStatus {
    /// Lowercase label used in files.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = crate::error::DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "aborted" => Ok(RunStatus::Aborted),
            other => Err(crate::error::DaqError::Storage(format!(
                "unknown run status '{other}'"
            ))),
        }
    }
}

/// Pass over the inner axis a point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// First pass.
    Forward,
    /// Second pass when retrace is on.
    Retrace,
}

impl Direction {
    /// Lowercase label used in files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Retrace => "retrace",
        }
    }
}

/// A swept axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisInfo {
    /// Parameter name.
    pub name: String,
    /// Physical unit.
    pub unit: String,
    /// Setpoints in sweep order.
    pub values: Vec<f64>,
}

/// An observable recorded at each point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableInfo {
    /// Parameter name.
    pub name: String,
    /// Physical unit.
    pub unit: String,
    /// Reading shape.
    pub kind: ObservableKind,
}

/// Layout of a 2D dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    /// Measurement name, e.g. `"gate map cooldown 3"`.
    pub measurement_name: String,
    /// Experiment the run belongs to.
    pub experiment: Option<String>,
    /// Slow axis.
    pub outer: AxisInfo,
    /// Fast axis.
    pub inner: AxisInfo,
    /// Observables in reading order.
    pub observables: Vec<ObservableInfo>,
    /// Whether each inner trace is measured twice.
    pub retrace: bool,
}

impl DatasetSchema {
    /// Flattened observable column names, in reading order.
    pub fn observable_columns(&self) -> Vec<String> {
        self.observables
            .iter()
            .flat_map(|o| {
                o.kind
                    .column_suffixes()
                    .iter()
                    .map(move |suffix| format!("{}{suffix}", o.name))
            })
            .collect()
    }

    /// Position of an observable by name.
    pub fn observable_index(&self, name: &str) -> Option<usize> {
        self.observables.iter().position(|o| o.name == name)
    }

    /// Number of points of a complete run.
    pub fn expected_points(&self) -> usize {
        let passes = if self.retrace { 2 } else { 1 };
        self.outer.values.len() * self.inner.values.len() * passes
    }
}

/// One measured grid coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// Row index.
    pub outer_index: usize,
    /// Column index.
    pub inner_index: usize,
    /// Outer setpoint.
    pub outer: f64,
    /// Inner setpoint.
    pub inner: f64,
    /// Forward or retrace pass.
    pub direction: Direction,
    /// One reading per observable, in schema order.
    pub readings: Vec<Reading>,
}

/// A recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Run identity.
    pub run_id: RunId,
    /// Layout.
    pub schema: DatasetSchema,
    /// Context.
    pub metadata: Metadata,
    /// When recording started.
    pub started: DateTime<Utc>,
    /// Lifecycle state.
    pub status: RunStatus,
    /// Points in recording order.
    pub points: Vec<SweepPoint>,
}

impl Dataset {
    /// `true` when every planned point is present.
    pub fn is_complete(&self) -> bool {
        self.points.len() == self.schema.expected_points()
    }
}

/// Persists sweep points as they are measured.
#[async_trait]
pub trait Recorder: Send {
    /// Start a run and allocate its id.
    async fn begin(&mut self, schema: &DatasetSchema, metadata: &Metadata) -> AppResult<RunId>;

    /// Persist one point of the current run.
    async fn record(&mut self, point: &SweepPoint) -> AppResult<()>;

    /// Close the current run.
    async fn finish(&mut self, status: RunStatus) -> AppResult<()>;
}
