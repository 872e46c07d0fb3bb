//! Configuration System using Figment
//!
//! Configuration is layered, later layers overriding earlier ones:
//! 1. Built-in defaults (`Settings::default()`)
//! 2. A TOML file (`meso_daq.toml` unless another path is given)
//! 3. Environment variables prefixed with `MESODAQ_`, `__` separating nested keys
//!
//! # Environment Variable Overrides
//!
//! ```text
//! MESODAQ_APPLICATION__LOG_LEVEL=debug
//! MESODAQ_STORAGE__OUTPUT_DIR=/data/cooldown3
//! MESODAQ_STEPPER__STEP=0.1
//! MESODAQ_GATE_MAP__APPROACH_THRESHOLD=1e-9
//! ```
//!
//! # Example file
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [stepper]
//! step = 0.2
//! settle_delay = "500ms"
//! step_delay = "100ms"
//!
//! [gate_map]
//! temperature_channel = 8
//! approach_threshold = 5e-9
//!
//! [gate_map.safe_state]
//! current_compliance = 10e-9
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppResult, DaqError};
use crate::experiment::{GateMapSettings, LockInSetup};
use crate::sweep::StepperSettings;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "meso_daq.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MESODAQ_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings.
    pub application: ApplicationConfig,
    /// Where runs are written.
    pub storage: StorageConfig,
    /// Position stepper step and delays.
    pub stepper: StepperSettings,
    /// Gate-map procedure settings.
    pub gate_map: GateMapSettings,
    /// Lock-in initialisation settings.
    pub lockin: LockInSetup,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Application-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name.
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "meso_daq".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving one CSV file per run.
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Settings {
    /// Load from `meso_daq.toml` in the working directory and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load from a specific TOML file and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check semantic constraints the types cannot express.
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(DaqError::Configuration(msg));

        if !LOG_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "application.log_level '{}' is not one of {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        if !(self.stepper.step.is_finite() && self.stepper.step > 0.0) {
            return invalid(format!("stepper.step must be positive, got {}", self.stepper.step));
        }
        if let Some(threshold) = self.gate_map.approach_threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                return invalid(format!(
                    "gate_map.approach_threshold must be positive, got {threshold}"
                ));
            }
        }
        let safe = &self.gate_map.safe_state;
        if !(safe.current_compliance > 0.0 && safe.voltage_range > 0.0 && safe.current_range > 0.0)
        {
            return invalid("gate_map.safe_state limits and ranges must be positive".to_string());
        }
        if !(self.lockin.reference_frequency_hz > 0.0) {
            return invalid(format!(
                "lockin.reference_frequency_hz must be positive, got {}",
                self.lockin.reference_frequency_hz
            ));
        }
        if !(1..=8).contains(&self.lockin.demod.filter_order) {
            return invalid(format!(
                "lockin.demod.filter_order must be 1-8, got {}",
                self.lockin.demod.filter_order
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.stepper.step, 0.2);
        assert_eq!(settings.stepper.settle_delay, Duration::from_millis(500));
        assert_eq!(settings.gate_map.temperature_channel, 8);
    }

    #[test]
    fn file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "meso_daq.toml",
                r#"
                [application]
                log_level = "debug"

                [stepper]
                step = 0.05
                settle_delay = "1s"

                [gate_map]
                approach_threshold = 5e-9
                "#,
            )?;
            jail.set_env("MESODAQ_STORAGE__OUTPUT_DIR", "/tmp/runs");

            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert_eq!(settings.application.log_level, "debug");
            assert_eq!(settings.stepper.step, 0.05);
            assert_eq!(settings.stepper.settle_delay, Duration::from_secs(1));
            assert_eq!(settings.stepper.step_delay, Duration::from_millis(100));
            assert_eq!(settings.gate_map.approach_threshold, Some(5e-9));
            assert_eq!(settings.storage.output_dir, PathBuf::from("/tmp/runs"));
            Ok(())
        });
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.stepper.step = 0.0;
        assert!(matches!(settings.validate(), Err(DaqError::Configuration(_))));

        let mut settings = Settings::default();
        settings.application.log_level = "loud".into();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.gate_map.approach_threshold = Some(-1.0);
        assert!(settings.validate().is_err());
    }
}
