//! Tracing initialisation from [`Settings`].
//!
//! `application.log_level` sets the default filter; `RUST_LOG`, when set, takes
//! precedence and allows per-module directives:
//!
//! ```bash
//! RUST_LOG=meso_daq::sweep=debug meso_daq gate-map ...
//! ```

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, Settings};
use crate::error::{AppResult, DaqError};

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(settings: &Settings) -> String {
    settings.application.log_level.to_lowercase()
}

fn env_filter(settings: &Settings) -> AppResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directive(settings)).map_err(|e| {
            DaqError::Configuration(format!(
                "invalid log level '{}': {e}",
                settings.application.log_level
            ))
        }),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_from_config(settings: &Settings) -> AppResult<()> {
    let filter = env_filter(settings)?;
    let result = match settings.application.log_format {
        LogFormat::Pretty => fmt().with_env_filter(filter).with_target(true).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
    };
    result.map_err(|e| DaqError::Configuration(format!("failed to initialise tracing: {e}")))
}
