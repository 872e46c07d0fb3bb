//! Position stepper: move a controllable quantity to a target in small steps.
//!
//! Jumping a gate voltage can damage a device, so every repositioning goes
//! through [`go_to`], which walks a sweep array with settle delays and can halt
//! on a safety threshold read from a co-located observable (typically the gate's
//! leakage current).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::array::generate_sweep_array;
use crate::error::AppResult;
use crate::instrument::{Controllable, Monitored};

/// Step sizes and delays of the position stepper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepperSettings {
    /// Step between setpoints, in the quantity's unit.
    pub step: f64,
    /// Wait before the first and after the last step.
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Wait after each step.
    #[serde(with = "humantime_serde")]
    pub step_delay: Duration,
}

impl Default for StepperSettings {
    fn default() -> Self {
        Self {
            step: 0.2,
            settle_delay: Duration::from_millis(500),
            step_delay: Duration::from_millis(100),
        }
    }
}

/// How a [`go_to`] call ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The target was written.
    Reached(f64),
    /// The safety reading exceeded the threshold; `at` was the last value written.
    Halted {
        /// Last setpoint applied.
        at: f64,
        /// Magnitude of the reading that tripped the threshold.
        reading: f64,
    },
}

impl StepOutcome {
    /// Last setpoint actually applied.
    pub fn value(&self) -> f64 {
        match self {
            StepOutcome::Reached(value) => *value,
            StepOutcome::Halted { at, .. } => *at,
        }
    }

    /// `true` when the stepper stopped early.
    pub fn is_halted(&self) -> bool {
        matches!(self, StepOutcome::Halted { .. })
    }
}

/// Observational sink for stepper progress. Must not influence control flow.
pub trait ProgressSink: Send + Sync {
    /// Called after each setpoint is applied.
    fn step(&self, description: &str, index: usize, total: usize, value: f64);

    /// Called once when the stepper stops.
    fn finish(&self, _description: &str, _outcome: &StepOutcome) {}
}

/// Progress sink logging through `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn step(&self, description: &str, index: usize, total: usize, value: f64) {
        debug!(description, step = index + 1, total, value, "go_to progress");
    }

    fn finish(&self, description: &str, outcome: &StepOutcome) {
        info!(description, value = outcome.value(), halted = outcome.is_halted(), "go_to done");
    }
}

/// Progress sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn step(&self, _description: &str, _index: usize, _total: usize, _value: f64) {}
}

/// Options of a single [`go_to`] call.
#[derive(Debug, Clone, Default)]
pub struct GoTo {
    /// Step sizes and delays.
    pub settings: StepperSettings,
    /// Halt when the safety reading's magnitude exceeds this.
    pub threshold: Option<f64>,
    /// Human-readable label for progress reporting.
    pub description: Option<String>,
}

impl GoTo {
    /// Options with the given settings, no threshold and no label.
    pub fn new(settings: StepperSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Set the safety threshold.
    pub fn with_threshold(mut self, threshold: Option<f64>) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the progress label.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Step `target` from `start` to `end`, reading `safety` after every write.
///
/// Returns the last setpoint applied. A tripped threshold ends the walk early
/// without rolling back; instrument failures propagate.
pub async fn go_to(
    target: &dyn Controllable,
    safety: &dyn Monitored,
    start: f64,
    end: f64,
    options: &GoTo,
    progress: &dyn ProgressSink,
) -> AppResult<StepOutcome> {
    let settings = &options.settings;
    let description = options
        .description
        .clone()
        .unwrap_or_else(|| format!("sweeping {} to {end} {}", target.name(), target.unit()));
    let array = generate_sweep_array(start, end, settings.step)?;
    let total = array.len();

    debug!(quantity = target.name(), start, end, points = total, "go_to start");
    sleep(settings.settle_delay).await;

    let mut outcome = StepOutcome::Reached(start);
    for (index, &value) in array.iter().enumerate() {
        target.set(value).await?;
        let reading = safety.read().await?;
        progress.step(&description, index, total, value);
        sleep(settings.step_delay).await;

        outcome = StepOutcome::Reached(value);
        if let Some(threshold) = options.threshold {
            // A reading that is not a number counts as a trip.
            let magnitude = reading.magnitude();
            if !magnitude.is_finite() || magnitude > threshold {
                warn!(
                    quantity = target.name(),
                    at = value,
                    reading = magnitude,
                    threshold,
                    "Safety threshold exceeded, stopping"
                );
                outcome = StepOutcome::Halted {
                    at: value,
                    reading: magnitude,
                };
                break;
            }
        }
    }

    sleep(settings.settle_delay).await;
    progress.finish(&description, &outcome);
    Ok(outcome)
}
