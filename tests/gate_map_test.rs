//! Gate-map procedure against a simulated station.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    assert_close, assert_duration_near, fast_settings, MockStationBuilder, TimingTolerance,
};
use meso_daq::data::{Direction, MemoryRecorder, RunStatus};
use meso_daq::error::DaqError;
use meso_daq::experiment::{gate_map, GateMapRequest};
use meso_daq::instrument::mock::{MockCryostat, MockLockIn, MockSourceMeter};
use meso_daq::instrument::{Component, Reading, SmuChannel, Station};
use meso_daq::sweep::{generate_sweep_array, Retrace};

fn request(
    top: (f64, f64, f64),
    back: (f64, f64, f64),
    inner_delay: Duration,
    outer_delay: Duration,
) -> GateMapRequest {
    GateMapRequest::new(
        generate_sweep_array(top.0, top.1, top.2).unwrap(),
        inner_delay,
        generate_sweep_array(back.0, back.1, back.2).unwrap(),
        outer_delay,
    )
}

#[tokio::test(start_paused = true)]
async fn missing_required_lockin_fails_before_any_write() {
    let mock = MockStationBuilder::default().lockins(0).build();
    let mut req = request((0.0, 1.0, 0.5), (0.0, 1.0, 0.5), Duration::ZERO, Duration::ZERO);
    req.require_lockin = true;
    let mut recorder = MemoryRecorder::new();

    let result = gate_map(&mock.station, &req, &fast_settings(), &mut recorder).await;

    assert!(matches!(result, Err(DaqError::Configuration(_))));
    assert_eq!(mock.smu.initialise_calls(), 0);
    assert!(mock.smu.voltage_quantity(SmuChannel::A).history().await.is_empty());
    assert!(mock.smu.voltage_quantity(SmuChannel::B).history().await.is_empty());
    assert!(recorder.datasets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_lockin_is_tolerated_unless_required() {
    let mock = MockStationBuilder::default().lockins(0).build();
    let req = request((0.0, 0.2, 0.1), (0.0, 0.0, 0.1), Duration::ZERO, Duration::ZERO);
    let mut recorder = MemoryRecorder::new();

    gate_map(&mock.station, &req, &fast_settings(), &mut recorder)
        .await
        .unwrap();

    let dataset = recorder.last().unwrap();
    assert_eq!(dataset.schema.observables.len(), 4);
    assert_eq!(dataset.points.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn missing_smu_or_cryostat_is_a_configuration_error() {
    let req = request((0.0, 1.0, 0.5), (0.0, 1.0, 0.5), Duration::ZERO, Duration::ZERO);

    let mock = MockStationBuilder::default().without_cryostat().build();
    let mut recorder = MemoryRecorder::new();
    let result = gate_map(&mock.station, &req, &fast_settings(), &mut recorder).await;
    assert!(matches!(result, Err(DaqError::Configuration(_))));
    assert_eq!(mock.smu.initialise_calls(), 0);

    let mock = MockStationBuilder::default().without_smu().build();
    let result = gate_map(&mock.station, &req, &fast_settings(), &mut recorder).await;
    assert!(matches!(result, Err(DaqError::Configuration(_))));
    assert!(recorder.datasets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn records_lockins_cryostat_and_leakage() {
    let mock = MockStationBuilder::default().lockins(2).build();
    let mut req = request((-0.1, 0.1, 0.1), (0.0, 0.5, 0.5), Duration::ZERO, Duration::ZERO);
    req.label = Some("test".into());
    req.experiment = Some("cooldown 3".into());
    req.notes = Some("after thermal cycle".into());
    let settings = fast_settings();
    let mut recorder = MemoryRecorder::new();

    let run_id = gate_map(&mock.station, &req, &settings, &mut recorder)
        .await
        .unwrap();

    let dataset = recorder.dataset(run_id).unwrap();
    let schema = &dataset.schema;
    assert_eq!(schema.measurement_name, "gate map test");
    assert_eq!(schema.experiment.as_deref(), Some("cooldown 3"));
    assert_eq!(schema.outer.name, "smub_volt");
    assert_eq!(schema.inner.name, "smua_volt");
    let names: Vec<&str> = schema.observables.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "mf1_demod0_sample",
            "mf2_demod0_sample",
            "triton_T8",
            "triton_Bz",
            "smua_curr",
            "smub_curr"
        ]
    );

    assert_eq!(dataset.status, RunStatus::Completed);
    assert!(dataset.is_complete());
    assert_eq!(dataset.points.len(), 6);
    let coordinates: Vec<(f64, f64)> =
        dataset.points.iter().map(|p| (p.outer, p.inner)).collect();
    assert_eq!(coordinates[0], (0.0, -0.1));
    assert_eq!(coordinates[3].0, 0.5);
    assert_eq!(coordinates[5], (0.5, 0.1));

    let first = &dataset.points[0];
    assert!(matches!(first.readings[0], Reading::Demod(_)));
    assert_eq!(first.readings[2], Reading::scalar(0.012));
    assert_eq!(first.readings[3], Reading::scalar(0.5));
    assert_close(first.readings[4].real(), -0.1 / 1e12, "top-gate leakage");

    assert_eq!(mock.smu.initialise_calls(), 1);
    assert_eq!(
        mock.smu.safe_state().await,
        Some(settings.gate_map.safe_state.clone())
    );
    let metadata = &dataset.metadata;
    assert_eq!(
        metadata.instrument_config.get("source_meter").map(String::as_str),
        Some("Mock 2600")
    );
    assert_eq!(metadata.environment.get("triton_T8"), Some(&0.012));
    assert_eq!(metadata.environment.get("triton_Bz"), Some(&0.5));
    assert_eq!(metadata.annotations, "after thermal cycle");
}

#[tokio::test(start_paused = true)]
async fn lockins_of_one_driver_are_named_by_station() {
    let smu = Arc::new(MockSourceMeter::new());
    let station = Station::new()
        .with("mf1", Component::LockIn(Arc::new(MockLockIn::constant(1e-6, 0.0))))
        .with("mf2", Component::LockIn(Arc::new(MockLockIn::constant(2e-6, 0.0))))
        .with("keithley", Component::SourceMeter(smu))
        .with("triton", Component::Cryostat(Arc::new(MockCryostat::new(0.012, 0.0))));
    let req = request((0.0, 0.2, 0.1), (0.0, 0.0, 0.1), Duration::ZERO, Duration::ZERO);
    let mut recorder = MemoryRecorder::new();

    gate_map(&station, &req, &fast_settings(), &mut recorder)
        .await
        .unwrap();

    let dataset = recorder.last().unwrap();
    let names: Vec<&str> = dataset.schema.observables.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(&names[..2], &["mf1_demod0_sample", "mf2_demod0_sample"]);
    assert_close(dataset.points[0].readings[0].real(), 1e-6, "mf1 x");
    assert_close(dataset.points[0].readings[1].real(), 2e-6, "mf2 x");
}

#[tokio::test(start_paused = true)]
async fn approaches_start_point_before_mapping() {
    let mock = MockStationBuilder::default().resting(0.5, -0.2).build();
    let req = request((-0.1, 0.1, 0.1), (0.0, 0.5, 0.5), Duration::ZERO, Duration::ZERO);
    let mut recorder = MemoryRecorder::new();

    gate_map(&mock.station, &req, &fast_settings(), &mut recorder)
        .await
        .unwrap();

    // Approach 0.5 -> -0.1 in 0.2 steps, then the first forward trace.
    let top = mock.smu.voltage_quantity(SmuChannel::A).history().await;
    let approach = [0.5, 0.3, 0.1, -0.1];
    for (written, expected) in top.iter().zip(approach) {
        assert_close(*written, expected, "top-gate approach");
    }
    assert_close(top[approach.len()], -0.1, "first inner setpoint");

    // Back gate approaches -0.2 -> 0.0 before the first outer write.
    let back = mock.smu.voltage_quantity(SmuChannel::B).history().await;
    assert_close(back[0], -0.2, "back-gate approach start");
    assert_close(back[1], 0.0, "back-gate approach end");
    assert_eq!(back.len(), 2 + 2);
}

#[tokio::test(start_paused = true)]
async fn leakage_above_threshold_stops_before_measuring() {
    // 1 GΩ leakage: 1.5 nA is crossed above 1.5 V.
    let mock = MockStationBuilder::default().leakage(1e9).build();
    let req = request((3.0, 4.0, 0.5), (0.0, 1.0, 0.5), Duration::ZERO, Duration::ZERO);
    let mut settings = fast_settings();
    settings.gate_map.approach_threshold = Some(1.5e-9);
    let mut recorder = MemoryRecorder::new();

    let result = gate_map(&mock.station, &req, &settings, &mut recorder).await;

    match result {
        Err(DaqError::SafetyInterlock {
            quantity,
            at,
            threshold,
            ..
        }) => {
            assert_eq!(quantity, "smua_volt");
            assert_close(at, 1.6, "halt point");
            assert_eq!(threshold, 1.5e-9);
        }
        other => panic!("expected safety interlock, got {other:?}"),
    }

    let top = mock.smu.voltage_quantity(SmuChannel::A).history().await;
    assert!(top.iter().all(|v| *v <= 1.6 + 1e-9));
    assert!(mock.smu.voltage_quantity(SmuChannel::B).history().await.is_empty());
    assert!(recorder.datasets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retrace_doubles_every_row() {
    let mock = MockStationBuilder::default().build();
    let mut req = request((0.0, 0.2, 0.1), (0.0, 1.0, 1.0), Duration::ZERO, Duration::ZERO);
    req.retrace = Retrace::On;
    let mut recorder = MemoryRecorder::new();

    gate_map(&mock.station, &req, &fast_settings(), &mut recorder)
        .await
        .unwrap();

    let dataset = recorder.last().unwrap();
    assert!(dataset.schema.retrace);
    assert_eq!(dataset.points.len(), 2 * 2 * 3);
    let layout: Vec<(usize, Direction, usize)> = dataset
        .points
        .iter()
        .map(|p| (p.outer_index, p.direction, p.inner_index))
        .collect();
    assert_eq!(layout[0], (0, Direction::Forward, 0));
    assert_eq!(layout[3], (0, Direction::Retrace, 0));
    assert_eq!(layout[5], (0, Direction::Retrace, 2));
    assert_eq!(layout[6], (1, Direction::Forward, 0));
}

#[tokio::test(start_paused = true)]
async fn conservative_stepper_timing() {
    let mock = MockStationBuilder::default().build();
    let req = request(
        (-0.1, 0.1, 0.1),
        (0.0, 0.5, 0.5),
        Duration::from_millis(10),
        Duration::from_millis(50),
    );
    let mut recorder = MemoryRecorder::new();
    let settings = meso_daq::config::Settings::default();

    let start = tokio::time::Instant::now();
    gate_map(&mock.station, &req, &settings, &mut recorder)
        .await
        .unwrap();

    // Top approach: 2 setpoints, back approach: 1, each framed by two 500 ms settles.
    // Map: 2 rows x 50 ms + 6 points x 10 ms.
    let expected = Duration::from_millis((1000 + 2 * 100) + (1000 + 100) + (2 * 50 + 6 * 10));
    assert_duration_near(start.elapsed(), expected, TimingTolerance::Exact, "gate map");
}
