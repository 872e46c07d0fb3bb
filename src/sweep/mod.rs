//! Sweep engine: setpoint arrays, safe repositioning and the 2D sweep.

pub mod array;
pub mod stepper;
pub mod sweep2d;

pub use array::{generate_sweep_array, SweepArray, MAX_SWEEP_POINTS};
pub use stepper::{
    go_to, GoTo, NoProgress, ProgressSink, StepOutcome, StepperSettings, TracingProgress,
};
pub use sweep2d::{Axis, ReadMode, Retrace, Sweep2d};
