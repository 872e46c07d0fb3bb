//! Common test utilities for meso_daq integration tests
//!
//! This module provides reusable test helpers for:
//! - Timing assertions with appropriate tolerances
//! - A simulated station (SMU, cryostat, lock-ins) with handles to the mocks
//! - Settings without the conservative stepper delays

#![allow(dead_code)] // Not every test binary uses every helper

use std::sync::Arc;
use std::time::Duration;

use meso_daq::config::Settings;
use meso_daq::instrument::mock::{GateResponse, MockCryostat, MockLockIn, MockSourceMeter};
use meso_daq::instrument::{Component, Station};

/// Tolerance levels for timing assertions.
#[derive(Debug, Clone, Copy)]
pub enum TimingTolerance {
    /// Exact match - only for simulated time with `start_paused = true`
    Exact,
    /// 20% tolerance - real time on a developer machine
    Normal,
    /// 50% tolerance - for CI environments with variable load
    Relaxed,
}

impl TimingTolerance {
    /// Get the tolerance factor as a fraction (0.0 to 1.0)
    pub fn factor(&self) -> f64 {
        match self {
            TimingTolerance::Exact => 0.0,
            TimingTolerance::Normal => 0.20,
            TimingTolerance::Relaxed => 0.50,
        }
    }
}

/// Assert that a duration is within tolerance of an expected value.
///
/// # Panics
/// Panics if the actual duration is outside the tolerance range.
pub fn assert_duration_near(
    actual: Duration,
    expected: Duration,
    tolerance: TimingTolerance,
    context: &str,
) {
    let factor = tolerance.factor();
    let min = expected.mul_f64(1.0 - factor);
    let max = expected.mul_f64(1.0 + factor);

    assert!(
        actual >= min && actual <= max,
        "{}: expected {:?} ±{:.0}%, got {:?} (acceptable range: {:?} to {:?})",
        context,
        expected,
        factor * 100.0,
        actual,
        min,
        max
    );
}

/// Assert two floats agree to within `1e-9` relative.
pub fn assert_close(actual: f64, expected: f64, context: &str) {
    assert!(
        (actual - expected).abs() <= 1e-9 * expected.abs().max(f64::MIN_POSITIVE),
        "{context}: expected {expected}, got {actual}"
    );
}

/// A simulated station together with handles to its concrete mocks.
pub struct MockStation {
    pub station: Station,
    pub smu: Arc<MockSourceMeter>,
    pub lockins: Vec<Arc<MockLockIn>>,
}

/// Builder for [`MockStation`].
pub struct MockStationBuilder {
    lockins: usize,
    leakage_ohm: f64,
    resting: (f64, f64),
    cryostat: bool,
    smu: bool,
}

impl Default for MockStationBuilder {
    fn default() -> Self {
        Self {
            lockins: 1,
            leakage_ohm: 1e12,
            resting: (0.0, 0.0),
            cryostat: true,
            smu: true,
        }
    }
}

impl MockStationBuilder {
    pub fn lockins(mut self, count: usize) -> Self {
        self.lockins = count;
        self
    }

    pub fn leakage(mut self, ohm: f64) -> Self {
        self.leakage_ohm = ohm;
        self
    }

    pub fn resting(mut self, top: f64, back: f64) -> Self {
        self.resting = (top, back);
        self
    }

    pub fn without_cryostat(mut self) -> Self {
        self.cryostat = false;
        self
    }

    pub fn without_smu(mut self) -> Self {
        self.smu = false;
        self
    }

    /// Lock-ins are named `mf1`, `mf2`, ... and added before the other instruments.
    pub fn build(self) -> MockStation {
        let smu = Arc::new(MockSourceMeter::with_leakage(
            self.leakage_ohm,
            self.resting.0,
            self.resting.1,
        ));
        let mut station = Station::new();
        let mut lockins = Vec::new();
        for i in 0..self.lockins {
            let name = format!("mf{}", i + 1);
            let lockin = Arc::new(MockLockIn::coupled(&smu, GateResponse::default()));
            station.add(name, Component::LockIn(lockin.clone()));
            lockins.push(lockin);
        }
        if self.smu {
            station.add("keithley", Component::SourceMeter(smu.clone()));
        }
        if self.cryostat {
            station.add(
                "triton",
                Component::Cryostat(Arc::new(MockCryostat::new(0.012, 0.5))),
            );
        }
        MockStation {
            station,
            smu,
            lockins,
        }
    }
}

/// Default settings with zero stepper delays.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.stepper.settle_delay = Duration::ZERO;
    settings.stepper.step_delay = Duration::ZERO;
    settings
}
