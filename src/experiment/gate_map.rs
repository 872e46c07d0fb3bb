//! Gate map: a 2D map of the device response versus two gate voltages.
//!
//! Channel A of the source-measure unit drives the top gate (inner, fast axis),
//! channel B the back gate (outer, slow axis). Every attached lock-in's
//! demodulated sample is recorded together with the cryostat temperature and
//! field and both gate leakage currents.
//!
//! Known limitation: the SMU is forced into the configured safe state before
//! every map, overwriting any compliance limit set up by hand, and only SMUs
//! whose driver implements [`SourceMeter::initialise`] are supported.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

use crate::config::Settings;
use crate::data::{Recorder, RunId};
use crate::error::{AppResult, DaqError};
use crate::instrument::{
    Controllable, Labelled, Monitored, SmuChannel, SmuSafeState, SourceMeter, Station,
};
use crate::metadata::{Metadata, MetadataBuilder};
use crate::sweep::{
    go_to, Axis, GoTo, ProgressSink, ReadMode, Retrace, StepOutcome, StepperSettings, Sweep2d,
    SweepArray, TracingProgress,
};

/// Configurable behaviour of the gate-map procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateMapSettings {
    /// State the SMU is forced into before any motion.
    pub safe_state: SmuSafeState,
    /// Leakage-current magnitude (A) that halts the safe approach.
    pub approach_threshold: Option<f64>,
    /// Cryostat thermometer channel recorded with the map.
    pub temperature_channel: u8,
    /// Demodulator recorded on every lock-in.
    pub demod_index: usize,
}

impl Default for GateMapSettings {
    fn default() -> Self {
        Self {
            safe_state: SmuSafeState::default(),
            approach_threshold: None,
            temperature_channel: 8,
            demod_index: 0,
        }
    }
}

/// One gate-map invocation.
#[derive(Debug, Clone)]
pub struct GateMapRequest {
    /// Top-gate setpoints (inner axis).
    pub inner: SweepArray,
    /// Wait after each top-gate write.
    pub inner_delay: Duration,
    /// Back-gate setpoints (outer axis).
    pub outer: SweepArray,
    /// Wait after each back-gate write.
    pub outer_delay: Duration,
    /// Experiment the run belongs to.
    pub experiment: Option<String>,
    /// Free label appended to the measurement name.
    pub label: Option<String>,
    /// Measure every top-gate trace twice.
    pub retrace: Retrace,
    /// Refuse to run without at least one lock-in.
    pub require_lockin: bool,
    /// Notes stored with the run.
    pub notes: Option<String>,
}

impl GateMapRequest {
    /// Request with no label, no experiment and no retrace.
    pub fn new(
        inner: SweepArray,
        inner_delay: Duration,
        outer: SweepArray,
        outer_delay: Duration,
    ) -> Self {
        Self {
            inner,
            inner_delay,
            outer,
            outer_delay,
            experiment: None,
            label: None,
            retrace: Retrace::Off,
            require_lockin: false,
            notes: None,
        }
    }

    /// Measurement name used for the dataset.
    pub fn measurement_name(&self) -> String {
        match self.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => format!("gate map {label}"),
            _ => "gate map".to_string(),
        }
    }
}

/// The gate-map procedure bound to a station.
pub struct GateMap<'a> {
    station: &'a Station,
    settings: GateMapSettings,
    stepper: StepperSettings,
    progress: Arc<dyn ProgressSink>,
}

impl<'a> GateMap<'a> {
    /// Procedure using the gate-map and stepper sections of `settings`.
    pub fn new(station: &'a Station, settings: &Settings) -> Self {
        Self {
            station,
            settings: settings.gate_map.clone(),
            stepper: settings.stepper.clone(),
            progress: Arc::new(TracingProgress),
        }
    }

    /// Replace the progress sink used during the safe approach.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Run the map and return the recorded run's id.
    ///
    /// Discovery and validation failures are reported before the SMU is touched.
    /// A safe approach halted by the leakage threshold returns
    /// [`DaqError::SafetyInterlock`] before anything is recorded.
    pub async fn run(
        &self,
        request: &GateMapRequest,
        recorder: &mut dyn Recorder,
    ) -> AppResult<RunId> {
        let name = request.measurement_name();
        let span = info_span!("gate_map", name = %name);

        async move {
            let smu = self.station.source_meter()?;
            let cryostat = self.station.cryostat()?;
            let lockins = self.station.lockins();
            if lockins.is_empty() {
                if request.require_lockin {
                    return Err(DaqError::Configuration(
                        "no lock-in amplifier attached to the station".to_string(),
                    ));
                }
                warn!("No lock-in amplifier attached, recording DC observables only");
            }
            let lockin_names: Vec<&str> = lockins.iter().map(|(name, _)| *name).collect();
            info!(lockins = ?lockin_names, "Discovered lock-in amplifiers");

            let top = smu.voltage(SmuChannel::A);
            let back = smu.voltage(SmuChannel::B);

            let demod = self.settings.demod_index;
            let mut observables: Vec<Arc<dyn Monitored>> = lockins
                .iter()
                .map(|(name, lockin)| {
                    Arc::new(Labelled::new(
                        format!("{name}_demod{demod}_sample"),
                        lockin.demod_sample(demod),
                    )) as Arc<dyn Monitored>
                })
                .collect();
            let temperature = cryostat.temperature(self.settings.temperature_channel);
            let field = cryostat.field_z();
            observables.push(Arc::clone(&temperature));
            observables.push(Arc::clone(&field));
            observables.push(smu.current(SmuChannel::A));
            observables.push(smu.current(SmuChannel::B));

            let sweep = Sweep2d::new(
                Axis::new(Arc::clone(&back), request.outer.clone(), request.outer_delay),
                Axis::new(Arc::clone(&top), request.inner.clone(), request.inner_delay),
            )
            .observe_all(observables)
            .read_mode(ReadMode::Threaded)
            .retrace(request.retrace)
            .named(name.clone())
            .experiment(request.experiment.clone());
            sweep.validate()?;

            let mut environment = Vec::new();
            for observable in [&temperature, &field] {
                let value = observable.read().await?.real();
                environment.push((observable.name().to_string(), value));
            }
            let sweep =
                sweep.metadata(self.metadata(request, smu.as_ref(), &lockin_names, &environment)?);

            smu.initialise(&self.settings.safe_state).await?;

            let init_tg = top.get().await?;
            let init_bg = back.get().await?;
            self.approach(
                top.as_ref(),
                smu.current(SmuChannel::A).as_ref(),
                init_tg,
                request.inner.first_value(),
                "top gate",
            )
            .await?;
            self.approach(
                back.as_ref(),
                smu.current(SmuChannel::B).as_ref(),
                init_bg,
                request.outer.first_value(),
                "back gate",
            )
            .await?;

            sweep.run(recorder).await
        }
        .instrument(span)
        .await
    }

    async fn approach(
        &self,
        gate: &dyn Controllable,
        leakage: &dyn Monitored,
        from: f64,
        to: f64,
        label: &str,
    ) -> AppResult<()> {
        let options = GoTo::new(self.stepper.clone())
            .with_threshold(self.settings.approach_threshold)
            .with_description(format!("sweeping {label} to {to} {}", gate.unit()));

        match go_to(gate, leakage, from, to, &options, self.progress.as_ref()).await? {
            StepOutcome::Reached(_) => Ok(()),
            StepOutcome::Halted { at, reading } => Err(DaqError::SafetyInterlock {
                quantity: gate.name().to_string(),
                at,
                reading,
                threshold: self.settings.approach_threshold.unwrap_or(f64::NAN),
            }),
        }
    }

    fn metadata(
        &self,
        request: &GateMapRequest,
        smu: &dyn SourceMeter,
        lockins: &[&str],
        environment: &[(String, f64)],
    ) -> AppResult<Metadata> {
        let mut builder = MetadataBuilder::new()
            .experiment_name(request.experiment.as_deref().unwrap_or("gate map"))
            .description(&request.measurement_name())
            .instrument_config("source_meter", smu.model())
            .parameter(
                "inner_delay_ms",
                serde_json::json!(request.inner_delay.as_millis() as u64),
            )
            .parameter(
                "outer_delay_ms",
                serde_json::json!(request.outer_delay.as_millis() as u64),
            )
            .parameter("retrace", serde_json::json!(request.retrace == Retrace::On))
            .parameter(
                "safe_state",
                serde_json::to_value(&self.settings.safe_state)?,
            )
            .parameter(
                "approach_threshold",
                serde_json::json!(self.settings.approach_threshold),
            );
        for name in lockins {
            builder = builder.instrument_config(name, "lock-in amplifier");
        }
        for (name, value) in environment {
            builder = builder.environment(name, *value);
        }
        if let Some(notes) = &request.notes {
            builder = builder.annotations(notes);
        }
        Ok(builder.build())
    }
}

/// Run a gate map on `station` with the given settings.
pub async fn gate_map(
    station: &Station,
    request: &GateMapRequest,
    settings: &Settings,
    recorder: &mut dyn Recorder,
) -> AppResult<RunId> {
    GateMap::new(station, settings).run(request, recorder).await
}
