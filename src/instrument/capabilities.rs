//! Role traits for whole instruments.
//!
//! A driver implements the role it plays on the bench; procedures ask the
//! [`Station`](super::Station) for instruments by role rather than by concrete type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Controllable, Monitored};
use crate::error::AppResult;

/// Output channel of a dual-channel source-measure unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmuChannel {
    /// First channel (`smua`), conventionally the top gate.
    A,
    /// Second channel (`smub`), conventionally the back gate.
    B,
}

impl SmuChannel {
    /// Channel label as used in parameter names.
    pub fn as_str(&self) -> &'static str {
        match self {
            SmuChannel::A => "smua",
            SmuChannel::B => "smub",
        }
    }
}

/// Known safe output configuration applied before any sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmuSafeState {
    /// Current compliance limit in A.
    pub current_compliance: f64,
    /// Fixed voltage source range in V.
    pub voltage_range: f64,
    /// Current measurement range in A.
    pub current_range: f64,
    /// Number of power-line cycles per current measurement.
    pub nplc: f64,
}

impl Default for SmuSafeState {
    fn default() -> Self {
        Self {
            current_compliance: 10e-9,
            voltage_range: 20.0,
            current_range: 100e-9,
            nplc: 1.0,
        }
    }
}

/// Source-measure unit with two voltage-sourcing channels.
#[async_trait]
pub trait SourceMeter: Send + Sync {
    /// Model string reported by the instrument.
    fn model(&self) -> &str;

    /// Voltage setpoint of a channel.
    fn voltage(&self, channel: SmuChannel) -> Arc<dyn Controllable>;

    /// Measured (leakage) current of a channel.
    fn current(&self, channel: SmuChannel) -> Arc<dyn Monitored>;

    /// Force both channels into `state`: compliance, ranges, output on.
    ///
    /// Must be idempotent. Limits set up earlier are overwritten.
    async fn initialise(&self, state: &SmuSafeState) -> AppResult<()>;
}

/// How a lock-in obtains its reference signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReferenceMode {
    /// The instrument generates the reference and drives its signal output.
    Source {
        /// Oscillator frequency in Hz.
        frequency_hz: f64,
        /// Output amplitude in V.
        amplitude_v: f64,
        /// Output range in V.
        output_range_v: f64,
    },
    /// The instrument locks to an external reference, output disabled.
    ExternalSync,
}

/// Demodulator settings shared by all lock-ins in a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemodConfig {
    /// Harmonic of the reference to demodulate.
    pub harmonic: u32,
    /// Phase shift in degrees.
    pub phase_shift_deg: f64,
    /// Sinc filter on/off.
    pub sinc: bool,
    /// Low-pass filter time constant in s.
    #[serde(with = "humantime_serde")]
    pub time_constant: std::time::Duration,
    /// Low-pass filter order (1-8).
    pub filter_order: u8,
}

impl Default for DemodConfig {
    fn default() -> Self {
        Self {
            harmonic: 1,
            phase_shift_deg: 0.0,
            sinc: true,
            time_constant: std::time::Duration::from_millis(100),
            filter_order: 8,
        }
    }
}

/// Signal input settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// AC coupling.
    pub ac_coupled: bool,
    /// 50 Ω input impedance (otherwise 10 MΩ).
    pub imp50: bool,
    /// Differential input.
    pub differential: bool,
    /// Floating ground.
    pub floating: bool,
    /// Input range in V.
    pub range_v: f64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            ac_coupled: true,
            imp50: false,
            differential: true,
            floating: false,
            range_v: 3e-3,
        }
    }
}

/// Full configuration applied to one lock-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInConfig {
    /// Reference source or follower.
    pub reference: ReferenceMode,
    /// Demodulator 0 settings.
    pub demod: DemodConfig,
    /// Signal input 0 settings.
    pub input: InputConfig,
}

/// Lock-in amplifier.
#[async_trait]
pub trait LockIn: Send + Sync {
    /// Demodulated sample stream of demodulator `index`.
    fn demod_sample(&self, index: usize) -> Arc<dyn Monitored>;

    /// Apply a configuration.
    async fn configure(&self, config: &LockInConfig) -> AppResult<()>;
}

/// Cryostat / magnet controller.
pub trait Cryostat: Send + Sync {
    /// Temperature of a thermometer channel.
    fn temperature(&self, channel: u8) -> Arc<dyn Monitored>;

    /// Out-of-plane magnetic field.
    fn field_z(&self) -> Arc<dyn Monitored>;
}
