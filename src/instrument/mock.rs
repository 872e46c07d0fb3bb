//! Mock Instrument Implementations
//!
//! Provides simulated instruments for testing and for the CLI without physical hardware.
//! All mock devices use async-safe operations (`tokio::time::sleep`, not `std::thread::sleep`).
//!
//! # Available Mocks
//!
//! - `MockQuantity` - settable scalar with a write history and optional failure injection
//! - `MockObservable` - read-only scalar, constant or derived from a `MockQuantity`
//! - `MockSourceMeter` - two-channel SMU whose leakage current follows Ohm's law
//! - `MockLockIn` - lock-in returning a constant or a gate-dependent conductance
//! - `MockCryostat` - fixed temperature and field

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};

use super::capabilities::{
    Cryostat, LockIn, LockInConfig, SmuChannel, SmuSafeState, SourceMeter,
};
use super::{Controllable, DemodSample, Monitored, ObservableKind, Reading};
use crate::error::{AppResult, DaqError};

// =============================================================================
// MockQuantity - Simulated Controllable
// =============================================================================

/// Mock settable scalar
///
/// Records every write so tests can check exactly which setpoints reached the
/// "hardware".
///
/// # Example
///
/// ```rust
/// # async fn demo() -> meso_daq::error::AppResult<()> {
/// use meso_daq::instrument::{mock::MockQuantity, Controllable};
///
/// let gate = MockQuantity::new("smua_volt", "V", 0.0);
/// gate.set(0.5).await?;
/// assert_eq!(gate.get().await?, 0.5);
/// assert_eq!(gate.history().await, vec![0.5]);
/// # Ok(())
/// # }
/// ```
pub struct MockQuantity {
    name: String,
    unit: String,
    value: RwLock<f64>,
    history: RwLock<Vec<f64>>,
    fail_after_writes: Option<usize>,
}

impl MockQuantity {
    /// Create a quantity resting at `initial`.
    pub fn new(name: impl Into<String>, unit: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            value: RwLock::new(initial),
            history: RwLock::new(Vec::new()),
            fail_after_writes: None,
        }
    }

    /// Make every write after the first `writes` successful ones fail.
    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after_writes = Some(writes);
        self
    }

    /// Every value written so far, in order.
    pub async fn history(&self) -> Vec<f64> {
        self.history.read().await.clone()
    }

    /// Current value without going through the trait.
    pub async fn value(&self) -> f64 {
        *self.value.read().await
    }
}

#[async_trait]
impl Controllable for MockQuantity {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> &str {
        &self.unit
    }

    async fn get(&self) -> AppResult<f64> {
        Ok(*self.value.read().await)
    }

    async fn set(&self, value: f64) -> AppResult<()> {
        let mut history = self.history.write().await;
        if self
            .fail_after_writes
            .is_some_and(|limit| history.len() >= limit)
        {
            return Err(DaqError::Instrument(format!(
                "{}: simulated write failure at {value}",
                self.name
            )));
        }
        history.push(value);
        *self.value.write().await = value;
        tracing::trace!(quantity = %self.name, value, "MockQuantity set");
        Ok(())
    }
}

// =============================================================================
// MockObservable - Simulated Monitored scalar
// =============================================================================

enum Source {
    Constant(f64),
    Following {
        quantity: Arc<MockQuantity>,
        response: Box<dyn Fn(f64) -> f64 + Send + Sync>,
    },
}

/// Mock read-only scalar
///
/// Either constant or a function of a [`MockQuantity`]'s current value, with an
/// optional simulated read latency and failure injection.
pub struct MockObservable {
    name: String,
    unit: String,
    source: Source,
    latency: Duration,
    reads: AtomicUsize,
    fail_after_reads: Option<usize>,
}

impl MockObservable {
    /// Observable that always reads `value`.
    pub fn constant(name: impl Into<String>, unit: impl Into<String>, value: f64) -> Self {
        Self::with_source(name, unit, Source::Constant(value))
    }

    /// Observable computed from the current value of `quantity`.
    pub fn following<F>(
        name: impl Into<String>,
        unit: impl Into<String>,
        quantity: Arc<MockQuantity>,
        response: F,
    ) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::with_source(
            name,
            unit,
            Source::Following {
                quantity,
                response: Box::new(response),
            },
        )
    }

    fn with_source(name: impl Into<String>, unit: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            source,
            latency: Duration::ZERO,
            reads: AtomicUsize::new(0),
            fail_after_reads: None,
        }
    }

    /// Simulated time each read takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every read after the first `reads` successful ones fail.
    pub fn failing_after(mut self, reads: usize) -> Self {
        self.fail_after_reads = Some(reads);
        self
    }

    /// Number of successful reads so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Monitored for MockObservable {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> &str {
        &self.unit
    }

    async fn read(&self) -> AppResult<Reading> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        if self
            .fail_after_reads
            .is_some_and(|limit| self.reads.load(Ordering::SeqCst) >= limit)
        {
            return Err(DaqError::Instrument(format!(
                "{}: simulated read failure",
                self.name
            )));
        }
        let value = match &self.source {
            Source::Constant(value) => *value,
            Source::Following { quantity, response } => response(quantity.value().await),
        };
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(Reading::scalar(value))
    }
}

// =============================================================================
// MockSourceMeter - Simulated two-channel SMU
// =============================================================================

struct MockSmuChannel {
    voltage: Arc<MockQuantity>,
    current: Arc<MockObservable>,
}

impl MockSmuChannel {
    fn new(channel: SmuChannel, resistance_ohm: f64, resting_v: f64) -> Self {
        let voltage = Arc::new(MockQuantity::new(
            format!("{}_volt", channel.as_str()),
            "V",
            resting_v,
        ));
        let current = Arc::new(MockObservable::following(
            format!("{}_curr", channel.as_str()),
            "A",
            Arc::clone(&voltage),
            move |v| v / resistance_ohm,
        ));
        Self { voltage, current }
    }
}

/// Mock two-channel source-measure unit
///
/// Each channel's leakage current is `V / R` with a configurable gate leakage
/// resistance (default 1 TΩ).
pub struct MockSourceMeter {
    channel_a: MockSmuChannel,
    channel_b: MockSmuChannel,
    safe_state: RwLock<Option<SmuSafeState>>,
    initialise_calls: AtomicUsize,
}

impl MockSourceMeter {
    /// Both channels at 0 V with 1 TΩ leakage.
    pub fn new() -> Self {
        Self::with_leakage(1e12, 0.0, 0.0)
    }

    /// Custom leakage resistance and resting voltages.
    pub fn with_leakage(resistance_ohm: f64, resting_a: f64, resting_b: f64) -> Self {
        Self {
            channel_a: MockSmuChannel::new(SmuChannel::A, resistance_ohm, resting_a),
            channel_b: MockSmuChannel::new(SmuChannel::B, resistance_ohm, resting_b),
            safe_state: RwLock::new(None),
            initialise_calls: AtomicUsize::new(0),
        }
    }

    /// Concrete voltage quantity, for inspecting write history.
    pub fn voltage_quantity(&self, channel: SmuChannel) -> Arc<MockQuantity> {
        Arc::clone(&self.channel(channel).voltage)
    }

    /// Last applied safe state, if `initialise` ran.
    pub async fn safe_state(&self) -> Option<SmuSafeState> {
        self.safe_state.read().await.clone()
    }

    /// How many times `initialise` ran.
    pub fn initialise_calls(&self) -> usize {
        self.initialise_calls.load(Ordering::SeqCst)
    }

    fn channel(&self, channel: SmuChannel) -> &MockSmuChannel {
        match channel {
            SmuChannel::A => &self.channel_a,
            SmuChannel::B => &self.channel_b,
        }
    }
}

impl Default for MockSourceMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceMeter for MockSourceMeter {
    fn model(&self) -> &str {
        "Mock 2600"
    }

    fn voltage(&self, channel: SmuChannel) -> Arc<dyn Controllable> {
        self.channel(channel).voltage.clone()
    }

    fn current(&self, channel: SmuChannel) -> Arc<dyn Monitored> {
        self.channel(channel).current.clone()
    }

    async fn initialise(&self, state: &SmuSafeState) -> AppResult<()> {
        self.initialise_calls.fetch_add(1, Ordering::SeqCst);
        *self.safe_state.write().await = Some(state.clone());
        tracing::debug!(
            compliance = state.current_compliance,
            "MockSourceMeter: initialised to safe state"
        );
        Ok(())
    }
}

// =============================================================================
// MockLockIn - Simulated lock-in amplifier
// =============================================================================

/// Conductance pattern of a gate-defined dot, used by [`MockLockIn::coupled`].
///
/// Resonances are periodic in `lever_top·Vtg + lever_back·Vbg`, so a gate map
/// shows diagonal lines.
#[derive(Debug, Clone, Copy)]
pub struct GateResponse {
    /// Lever arm of the top gate.
    pub lever_top: f64,
    /// Lever arm of the back gate.
    pub lever_back: f64,
    /// Spacing of resonances in effective gate voltage.
    pub period: f64,
    /// Width of a resonance in effective gate voltage.
    pub width: f64,
    /// Peak in-phase signal in V.
    pub amplitude: f64,
}

impl Default for GateResponse {
    fn default() -> Self {
        Self {
            lever_top: 1.0,
            lever_back: 0.3,
            period: 0.25,
            width: 0.02,
            amplitude: 1e-4,
        }
    }
}

impl GateResponse {
    /// In-phase signal at the given gate voltages.
    pub fn signal(&self, v_top: f64, v_back: f64) -> f64 {
        let effective = self.lever_top * v_top + self.lever_back * v_back;
        let detuning = effective - (effective / self.period).round() * self.period;
        let cosh = (detuning / self.width).cosh();
        self.amplitude / (cosh * cosh)
    }
}

enum LockInSource {
    Constant(DemodSample),
    Coupled {
        top: Arc<MockQuantity>,
        back: Arc<MockQuantity>,
        response: GateResponse,
    },
}

struct MockDemod {
    name: String,
    source: Arc<LockInSource>,
    frequency: Arc<RwLock<f64>>,
}

#[async_trait]
impl Monitored for MockDemod {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> &str {
        "V"
    }

    fn kind(&self) -> ObservableKind {
        ObservableKind::Demod
    }

    async fn read(&self) -> AppResult<Reading> {
        let frequency = *self.frequency.read().await;
        let sample = match self.source.as_ref() {
            LockInSource::Constant(sample) => DemodSample {
                frequency,
                ..*sample
            },
            LockInSource::Coupled {
                top,
                back,
                response,
            } => {
                let x = response.signal(top.value().await, back.value().await);
                DemodSample {
                    x,
                    y: 0.05 * x,
                    frequency,
                }
            }
        };
        Ok(Reading::Demod(sample))
    }
}

/// Mock lock-in amplifier
pub struct MockLockIn {
    name: String,
    source: Arc<LockInSource>,
    frequency: Arc<RwLock<f64>>,
    config: RwLock<Option<LockInConfig>>,
}

impl MockLockIn {
    /// Lock-in always reading `x + iy`.
    pub fn constant(x: f64, y: f64) -> Self {
        Self::with_source(LockInSource::Constant(DemodSample {
            x,
            y,
            frequency: 0.0,
        }))
    }

    /// Lock-in whose signal follows the SMU gate voltages through `response`.
    pub fn coupled(smu: &MockSourceMeter, response: GateResponse) -> Self {
        Self::with_source(LockInSource::Coupled {
            top: smu.voltage_quantity(SmuChannel::A),
            back: smu.voltage_quantity(SmuChannel::B),
            response,
        })
    }

    fn with_source(source: LockInSource) -> Self {
        Self {
            name: "lockin".to_string(),
            source: Arc::new(source),
            frequency: Arc::new(RwLock::new(0.0)),
            config: RwLock::new(None),
        }
    }

    /// Name prefix used for demodulator observables.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Last configuration applied.
    pub async fn config(&self) -> Option<LockInConfig> {
        self.config.read().await.clone()
    }
}

#[async_trait]
impl LockIn for MockLockIn {
    fn demod_sample(&self, index: usize) -> Arc<dyn Monitored> {
        Arc::new(MockDemod {
            name: format!("{}_demod{index}_sample", self.name),
            source: Arc::clone(&self.source),
            frequency: Arc::clone(&self.frequency),
        })
    }

    async fn configure(&self, config: &LockInConfig) -> AppResult<()> {
        if let super::ReferenceMode::Source { frequency_hz, .. } = config.reference {
            *self.frequency.write().await = frequency_hz;
        }
        *self.config.write().await = Some(config.clone());
        Ok(())
    }
}

// =============================================================================
// MockCryostat
// =============================================================================

/// Mock cryostat with fixed temperature (all channels) and field
pub struct MockCryostat {
    temperature_k: f64,
    field_t: f64,
}

impl MockCryostat {
    /// Fixed readings.
    pub fn new(temperature_k: f64, field_t: f64) -> Self {
        Self {
            temperature_k,
            field_t,
        }
    }
}

impl Cryostat for MockCryostat {
    fn temperature(&self, channel: u8) -> Arc<dyn Monitored> {
        Arc::new(MockObservable::constant(
            format!("triton_T{channel}"),
            "K",
            self.temperature_k,
        ))
    }

    fn field_z(&self) -> Arc<dyn Monitored> {
        Arc::new(MockObservable::constant("triton_Bz", "T", self.field_t))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
