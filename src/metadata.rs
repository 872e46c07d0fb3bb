//! Experimental metadata stored alongside every recorded run.
//!
//! The `Metadata` struct captures the context of a measurement so a dataset can be
//! understood and re-analyzed later:
//!
//! - **`experiment_name`**: the experiment (sample/cooldown) the run belongs to.
//! - **`description`**: free-text description of the run.
//! - **`instrument_config`**: snapshot of the instruments used, by station name.
//! - **`parameters`**: procedure parameters (delays, thresholds, safe state) as JSON.
//! - **`annotations`**: notes made during the experiment.
//! - **`environment`**: environmental readings at the start of the run.
//! - **`software_version`**: version of this crate, captured automatically.
//!
//! A `MetadataBuilder` assembles one step by step. Recorders persist it with the
//! run (the CSV recorder as a commented JSON header).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Captures comprehensive metadata for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    /// The experiment this run belongs to.
    pub experiment_name: String,
    /// A detailed description of the run.
    pub description: String,
    /// Configuration of the instruments used.
    pub instrument_config: HashMap<String, String>,
    /// Procedure parameters.
    pub parameters: HashMap<String, serde_json::Value>,
    /// User annotations or notes.
    pub annotations: String,
    /// Environmental conditions (e.g., mixing-chamber temperature).
    pub environment: HashMap<String, f64>,
    /// Version of the acquisition software.
    pub software_version: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            experiment_name: "Default Experiment".to_string(),
            description: "".to_string(),
            instrument_config: HashMap::new(),
            parameters: HashMap::new(),
            annotations: "".to_string(),
            environment: HashMap::new(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A builder for constructing `Metadata` instances.
#[derive(Default)]
pub struct MetadataBuilder {
    inner: Metadata,
}

#[allow(missing_docs)]
impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn experiment_name(mut self, name: &str) -> Self {
        self.inner.experiment_name = name.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.inner.description = description.to_string();
        self
    }

    pub fn instrument_config(mut self, key: &str, value: &str) -> Self {
        self.inner
            .instrument_config
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn parameter(mut self, key: &str, value: serde_json::Value) -> Self {
        self.inner.parameters.insert(key.to_string(), value);
        self
    }

    pub fn annotations(mut self, annotations: &str) -> Self {
        self.inner.annotations = annotations.to_string();
        self
    }

    pub fn environment(mut self, key: &str, value: f64) -> Self {
        self.inner.environment.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Metadata {
        self.inner
    }
}
