//! Instrument capability layer.
//!
//! The sweep engine never talks to a driver directly. It sees two kinds of handle:
//!
//! - [`Controllable`]: a named, settable/gettable scalar such as a gate voltage.
//! - [`Monitored`]: a named, read-only observable returning a [`Reading`], either a
//!   plain scalar (temperature, field, leakage current) or a lock-in
//!   [`DemodSample`].
//!
//! Whole instruments are exposed through the role traits in [`capabilities`] and
//! collected in a [`Station`], which is passed explicitly to every procedure.

use std::sync::Arc;

use async_trait::async_trait;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub mod capabilities;
pub mod mock;
pub mod station;

pub use capabilities::{
    Cryostat, DemodConfig, InputConfig, LockIn, LockInConfig, ReferenceMode, SmuChannel,
    SmuSafeState, SourceMeter,
};
pub use station::{Component, Role, Station};

/// A settable/gettable scalar owned by an instrument.
#[async_trait]
pub trait Controllable: Send + Sync {
    /// Parameter name, used as column/axis name in recorded datasets.
    fn name(&self) -> &str;

    /// Physical unit, e.g. `"V"`.
    fn unit(&self) -> &str;

    /// Read back the current value.
    async fn get(&self) -> AppResult<f64>;

    /// Write a new setpoint.
    async fn set(&self, value: f64) -> AppResult<()>;
}

/// A read-only observable sampled at every sweep point.
#[async_trait]
pub trait Monitored: Send + Sync {
    /// Parameter name, used as column name in recorded datasets.
    fn name(&self) -> &str;

    /// Physical unit of the scalar (or of the demodulated components).
    fn unit(&self) -> &str;

    /// Shape of the readings this observable produces.
    fn kind(&self) -> ObservableKind {
        ObservableKind::Scalar
    }

    /// Take one reading.
    async fn read(&self) -> AppResult<Reading>;
}

/// An observable recorded under a different name.
///
/// Drivers name their parameters themselves; a station can hold two instruments
/// of the same driver, so procedures relabel them with the station name.
pub struct Labelled {
    name: String,
    inner: Arc<dyn Monitored>,
}

impl Labelled {
    /// Wrap `inner` so it reports `name`.
    pub fn new(name: impl Into<String>, inner: Arc<dyn Monitored>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }
}

#[async_trait]
impl Monitored for Labelled {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> &str {
        self.inner.unit()
    }

    fn kind(&self) -> ObservableKind {
        self.inner.kind()
    }

    async fn read(&self) -> AppResult<Reading> {
        self.inner.read().await
    }
}

/// Shape of an observable's readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservableKind {
    /// A single real value.
    Scalar,
    /// A lock-in demodulated sample (in-phase and quadrature).
    Demod,
}

impl ObservableKind {
    /// Column suffixes used when a reading of this kind is flattened.
    pub fn column_suffixes(&self) -> &'static [&'static str] {
        match self {
            ObservableKind::Scalar => &[""],
            ObservableKind::Demod => &["_x", "_y", "_r", "_theta"],
        }
    }
}

/// Demodulated lock-in sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemodSample {
    /// In-phase component.
    pub x: f64,
    /// Quadrature component.
    pub y: f64,
    /// Reference frequency at the time of the sample, in Hz.
    pub frequency: f64,
}

impl DemodSample {
    /// The sample as a complex number `x + iy`.
    pub fn as_complex(&self) -> Complex64 {
        Complex64::new(self.x, self.y)
    }

    /// Amplitude `sqrt(x² + y²)`.
    pub fn r(&self) -> f64 {
        self.as_complex().norm()
    }

    /// Phase in radians.
    pub fn theta(&self) -> f64 {
        self.as_complex().arg()
    }
}

/// One reading of a [`Monitored`] observable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    /// Real-valued reading.
    Scalar {
        /// The value.
        value: f64,
    },
    /// Lock-in sample.
    Demod(DemodSample),
}

impl Reading {
    /// Scalar reading shorthand.
    pub fn scalar(value: f64) -> Self {
        Reading::Scalar { value }
    }

    /// Shape of this reading.
    pub fn kind(&self) -> ObservableKind {
        match self {
            Reading::Scalar { .. } => ObservableKind::Scalar,
            Reading::Demod(_) => ObservableKind::Demod,
        }
    }

    /// Magnitude used for safety thresholds.
    pub fn magnitude(&self) -> f64 {
        match self {
            Reading::Scalar { value } => value.abs(),
            Reading::Demod(sample) => sample.r(),
        }
    }

    /// Real part (the value itself for scalars).
    pub fn real(&self) -> f64 {
        match self {
            Reading::Scalar { value } => *value,
            Reading::Demod(sample) => sample.x,
        }
    }

    /// Imaginary part, `None` when the reading has none.
    pub fn imag(&self) -> Option<f64> {
        match self {
            Reading::Scalar { .. } => None,
            Reading::Demod(sample) => Some(sample.y),
        }
    }

    /// Flatten into the columns described by [`ObservableKind::column_suffixes`].
    pub fn columns(&self) -> Vec<f64> {
        match self {
            Reading::Scalar { value } => vec![*value],
            Reading::Demod(s) => vec![s.x, s.y, s.r(), s.theta()],
        }
    }

    /// Inverse of [`Reading::columns`].
    pub fn from_columns(kind: ObservableKind, values: &[f64]) -> Option<Self> {
        match (kind, values) {
            (ObservableKind::Scalar, [value]) => Some(Reading::scalar(*value)),
            (ObservableKind::Demod, [x, y, _, _]) => Some(Reading::Demod(DemodSample {
                x: *x,
                y: *y,
                frequency: f64::NAN,
            })),
            _ => None,
        }
    }
}
