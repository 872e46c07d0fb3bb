//! Lock-in initialisation.
//!
//! The first lock-in on the station generates the reference and drives the
//! excitation; every further lock-in locks to it through its external reference
//! input with its own output switched off. All of them share one demodulator and
//! signal-input configuration, so their samples are directly comparable.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppResult, DaqError};
use crate::instrument::{DemodConfig, InputConfig, LockInConfig, ReferenceMode, Station};

/// Settings applied by [`initialise_lockins`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockInSetup {
    /// Reference oscillator frequency in Hz.
    pub reference_frequency_hz: f64,
    /// Excitation amplitude in V (peak, so √2 is 1 V rms).
    pub amplitude_v: f64,
    /// Signal output range in V.
    pub output_range_v: f64,
    /// Demodulator settings for every lock-in.
    pub demod: DemodConfig,
    /// Signal input settings for every lock-in.
    pub input: InputConfig,
}

impl Default for LockInSetup {
    fn default() -> Self {
        Self {
            reference_frequency_hz: 127.0,
            amplitude_v: std::f64::consts::SQRT_2,
            output_range_v: 10.0,
            demod: DemodConfig::default(),
            input: InputConfig::default(),
        }
    }
}

impl LockInSetup {
    fn reference_config(&self) -> LockInConfig {
        LockInConfig {
            reference: ReferenceMode::Source {
                frequency_hz: self.reference_frequency_hz,
                amplitude_v: self.amplitude_v,
                output_range_v: self.output_range_v,
            },
            demod: self.demod.clone(),
            input: self.input.clone(),
        }
    }

    fn follower_config(&self) -> LockInConfig {
        LockInConfig {
            reference: ReferenceMode::ExternalSync,
            demod: self.demod.clone(),
            input: self.input.clone(),
        }
    }
}

/// Which lock-in sources the reference and which follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInSummary {
    /// Station name of the reference source.
    pub reference: String,
    /// Station names of the externally synced lock-ins, in station order.
    pub followers: Vec<String>,
}

/// Configure every lock-in on `station`.
pub async fn initialise_lockins(
    station: &Station,
    setup: &LockInSetup,
) -> AppResult<LockInSummary> {
    let lockins = station.lockins();
    let Some(((reference_name, reference), followers)) = lockins.split_first() else {
        return Err(DaqError::Configuration(
            "no lock-in amplifier attached to the station".to_string(),
        ));
    };

    reference.configure(&setup.reference_config()).await?;
    info!(
        lockin = reference_name,
        frequency_hz = setup.reference_frequency_hz,
        amplitude_v = setup.amplitude_v,
        "Reference lock-in sourcing excitation"
    );

    let follower_config = setup.follower_config();
    for (name, lockin) in followers {
        lockin.configure(&follower_config).await?;
        info!(lockin = name, reference = reference_name, "Lock-in synced to external reference");
    }

    Ok(LockInSummary {
        reference: reference_name.to_string(),
        followers: followers.iter().map(|(name, _)| name.to_string()).collect(),
    })
}
