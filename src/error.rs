//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur while driving an experiment, from
//! malformed sweep requests to instrument I/O failures.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidRange`**: A sweep array was requested with a non-positive or non-finite
//!   step, or with endpoints that cannot be swept. Surfaced immediately, never retried.
//! - **`Instrument`**: Any failure writing a controllable quantity or reading a monitored
//!   observable. Propagated straight up through the sweep and the gate-map procedure.
//!   Hardware writes are never retried automatically.
//! - **`Configuration`**: Semantic problems detected before any hardware motion, such as a
//!   missing source-measure unit or no lock-in amplifier when one is required.
//! - **`SafetyInterlock`**: The safe approach to a sweep's start point was halted by the
//!   leakage-current threshold, so the measurement never started.
//! - **`Config`**: Wraps errors from `figment` while loading configuration files.
//! - **`FeatureNotEnabled`**: Functionality (like a storage backend) that was not included
//!   at compile time via feature flags.
//!
//! Reaching a safety threshold inside the position stepper is deliberately *not* an
//! error: it is reported as [`crate::sweep::StepOutcome::Halted`].

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised by the sweep, instrument and recording layers.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Malformed sweep-array request.
    #[error("Invalid sweep range {start} -> {stop} (step {step}): {reason}")]
    InvalidRange {
        /// First requested value.
        start: f64,
        /// Last requested value.
        stop: f64,
        /// Requested step.
        step: f64,
        /// Why the request was rejected.
        reason: String,
    },

    /// Failure talking to an instrument.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// Configuration validation error, raised before any hardware motion.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Safe approach halted on a safety threshold.
    #[error("Safety interlock on '{quantity}': halted at {at}, reading {reading} > {threshold}")]
    SafetyInterlock {
        /// Quantity that was being moved.
        quantity: String,
        /// Last value applied before halting.
        at: f64,
        /// Magnitude of the safety reading that tripped the threshold.
        reading: f64,
        /// Configured threshold.
        threshold: f64,
    },

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("I/O error: {0}")]
    #[allow(missing_docs)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    #[allow(missing_docs)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    #[allow(missing_docs)]
    Csv(#[from] csv::Error),

    /// Recording collaborator failure not covered by the I/O variants.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A complex projection was asked of a reading without an imaginary part.
    #[error("Observable '{0}' has no imaginary part")]
    NoImaginaryPart(String),

    /// Functionality compiled out via cargo features.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}
