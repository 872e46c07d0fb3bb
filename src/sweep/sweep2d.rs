//! Two-axis parametric sweep.
//!
//! The outer axis changes slowest: for each outer setpoint the inner axis is
//! walked completely (and, with [`Retrace::On`], walked a second time) before
//! the outer axis advances. Every visited coordinate produces one
//! [`SweepPoint`] that goes straight to the [`Recorder`].

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::array::SweepArray;
use crate::data::{
    AxisInfo, DatasetSchema, Direction, ObservableInfo, Recorder, RunId, RunStatus, SweepPoint,
};
use crate::error::{AppResult, DaqError};
use crate::instrument::{Controllable, Monitored, Reading};
use crate::metadata::Metadata;

/// One sweep axis: what to set, to which values, and how long to wait after each write.
#[derive(Clone)]
pub struct Axis {
    /// Quantity written along this axis.
    pub quantity: Arc<dyn Controllable>,
    /// Setpoints, in sweep order.
    pub values: SweepArray,
    /// Wait after each write of this axis.
    pub delay: Duration,
}

impl Axis {
    /// New axis.
    pub fn new(quantity: Arc<dyn Controllable>, values: SweepArray, delay: Duration) -> Self {
        Self {
            quantity,
            values,
            delay,
        }
    }

    fn info(&self) -> AxisInfo {
        AxisInfo {
            name: self.quantity.name().to_string(),
            unit: self.quantity.unit().to_string(),
            values: self.values.to_vec(),
        }
    }
}

/// Whether each inner trace is measured a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retrace {
    /// Forward traces only.
    #[default]
    Off,
    /// Re-walk the inner array right after each forward trace.
    On,
}

impl Retrace {
    /// Passes made over the inner array for every outer setpoint.
    pub fn directions(&self) -> &'static [Direction] {
        match self {
            Retrace::Off => &[Direction::Forward],
            Retrace::On => &[Direction::Forward, Direction::Retrace],
        }
    }
}

impl From<bool> for Retrace {
    fn from(enabled: bool) -> Self {
        if enabled {
            Retrace::On
        } else {
            Retrace::Off
        }
    }
}

/// How observables are read at each point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// One after another on the sweep task.
    #[default]
    Sequential,
    /// One tokio task per observable, all joined before the point is recorded.
    Threaded,
}

/// A configured 2D sweep.
pub struct Sweep2d {
    outer: Axis,
    inner: Axis,
    observables: Vec<Arc<dyn Monitored>>,
    retrace: Retrace,
    read_mode: ReadMode,
    measurement_name: String,
    experiment: Option<String>,
    metadata: Metadata,
}

impl Sweep2d {
    /// Sweep `inner` for every value of `outer`. Add observables before running.
    pub fn new(outer: Axis, inner: Axis) -> Self {
        Self {
            outer,
            inner,
            observables: Vec::new(),
            retrace: Retrace::Off,
            read_mode: ReadMode::Sequential,
            measurement_name: "sweep2d".to_string(),
            experiment: None,
            metadata: Metadata::default(),
        }
    }

    /// Add an observable read at every point.
    pub fn observe(mut self, observable: Arc<dyn Monitored>) -> Self {
        self.observables.push(observable);
        self
    }

    /// Add several observables, keeping their order.
    pub fn observe_all(
        mut self,
        observables: impl IntoIterator<Item = Arc<dyn Monitored>>,
    ) -> Self {
        self.observables.extend(observables);
        self
    }

    /// Enable or disable retrace.
    pub fn retrace(mut self, retrace: Retrace) -> Self {
        self.retrace = retrace;
        self
    }

    /// Choose sequential or threaded reads.
    pub fn read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    /// Measurement name stored with the dataset.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.measurement_name = name.into();
        self
    }

    /// Experiment the dataset belongs to.
    pub fn experiment(mut self, experiment: Option<String>) -> Self {
        self.experiment = experiment;
        self
    }

    /// Metadata stored with the dataset.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of records a complete run produces.
    pub fn expected_points(&self) -> usize {
        self.outer.values.len() * self.inner.values.len() * self.retrace.directions().len()
    }

    /// Dataset layout handed to the recorder.
    pub fn schema(&self) -> DatasetSchema {
        DatasetSchema {
            measurement_name: self.measurement_name.clone(),
            experiment: self.experiment.clone(),
            outer: self.outer.info(),
            inner: self.inner.info(),
            observables: self
                .observables
                .iter()
                .map(|o| ObservableInfo {
                    name: o.name().to_string(),
                    unit: o.unit().to_string(),
                    kind: o.kind(),
                })
                .collect(),
            retrace: self.retrace == Retrace::On,
        }
    }

    /// Check the sweep can run without touching hardware.
    pub fn validate(&self) -> AppResult<()> {
        if self.observables.is_empty() {
            return Err(DaqError::Configuration(
                "a 2D sweep needs at least one observable".to_string(),
            ));
        }
        if self.outer.quantity.name() == self.inner.quantity.name() {
            return Err(DaqError::Configuration(format!(
                "outer and inner axes both drive '{}'",
                self.outer.quantity.name()
            )));
        }
        let mut seen = HashSet::new();
        seen.insert(self.outer.quantity.name());
        seen.insert(self.inner.quantity.name());
        for observable in &self.observables {
            if !seen.insert(observable.name()) {
                return Err(DaqError::Configuration(format!(
                    "duplicate parameter name '{}' in sweep",
                    observable.name()
                )));
            }
        }
        Ok(())
    }

    /// Run the sweep, streaming every point to `recorder`.
    ///
    /// The recorder is always finished: `Completed` on success, `Aborted` when a
    /// read or write fails. The first failure is returned and the points recorded
    /// before it stay in the dataset.
    pub async fn run(&self, recorder: &mut dyn Recorder) -> AppResult<RunId> {
        self.validate()?;
        let schema = self.schema();
        let span = info_span!("sweep2d", name = %self.measurement_name);

        async move {
            let run_id = recorder.begin(&schema, &self.metadata).await?;
            info!(
                run = %run_id,
                outer = %schema.outer.name,
                inner = %schema.inner.name,
                points = self.expected_points(),
                "Starting 2D sweep"
            );

            let result = self.walk(recorder).await;
            let status = match result {
                Ok(_) => RunStatus::Completed,
                Err(_) => RunStatus::Aborted,
            };
            let finished = recorder.finish(status).await;

            match result {
                Ok(recorded) => {
                    finished?;
                    info!(run = %run_id, recorded, "2D sweep complete");
                    Ok(run_id)
                }
                Err(err) => {
                    if let Err(finish_err) = finished {
                        warn!(run = %run_id, error = %finish_err, "Failed to close aborted run");
                    }
                    error!(run = %run_id, error = %err, "2D sweep aborted");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn walk(&self, recorder: &mut dyn Recorder) -> AppResult<usize> {
        let mut recorded = 0;
        for (outer_index, &outer) in self.outer.values.iter().enumerate() {
            self.outer.quantity.set(outer).await?;
            sleep(self.outer.delay).await;
            debug!(outer_index, outer, "Outer setpoint applied");

            for &direction in self.retrace.directions() {
                for (inner_index, &inner) in self.inner.values.iter().enumerate() {
                    self.inner.quantity.set(inner).await?;
                    sleep(self.inner.delay).await;

                    let readings = self.read_all().await?;
                    recorder
                        .record(&SweepPoint {
                            outer_index,
                            inner_index,
                            outer,
                            inner,
                            direction,
                            readings,
                        })
                        .await?;
                    recorded += 1;
                }
            }
        }
        Ok(recorded)
    }

    async fn read_all(&self) -> AppResult<Vec<Reading>> {
        match self.read_mode {
            ReadMode::Sequential => {
                let mut readings = Vec::with_capacity(self.observables.len());
                for observable in &self.observables {
                    readings.push(observable.read().await?);
                }
                Ok(readings)
            }
            ReadMode::Threaded => {
                let handles = self.observables.iter().map(|observable| {
                    let observable = Arc::clone(observable);
                    tokio::spawn(async move { observable.read().await })
                });
                // Join every read before looking at results so none is left running.
                join_all(handles)
                    .await
                    .into_iter()
                    .map(|joined| {
                        joined.map_err(|err| {
                            DaqError::Instrument(format!("observable read task failed: {err}"))
                        })?
                    })
                    .collect()
            }
        }
    }
}
