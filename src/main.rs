//! meso_daq command line: simulated gate maps and run inspection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use meso_daq::analysis::{grid, ComplexPart, PhaseUnit, Projection};
use meso_daq::config::Settings;
use meso_daq::data::{load_csv_run, CsvRecorder, Direction};
use meso_daq::experiment::{gate_map, initialise_lockins, GateMapRequest};
use meso_daq::instrument::mock::{GateResponse, MockCryostat, MockLockIn, MockSourceMeter};
use meso_daq::instrument::{Component, Station};
use meso_daq::sweep::{generate_sweep_array, Retrace};
use meso_daq::tracing_init;

#[derive(Parser)]
#[command(name = "meso_daq")]
#[command(about = "Gate maps and run inspection for mesoscopic-physics experiments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to meso_daq.toml in the working directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a gate map against a simulated station and record it to CSV.
    GateMap {
        /// First top-gate voltage (inner axis)
        #[arg(long, allow_negative_numbers = true)]
        top_start: f64,
        /// Last top-gate voltage
        #[arg(long, allow_negative_numbers = true)]
        top_stop: f64,
        /// Top-gate step
        #[arg(long)]
        top_step: f64,
        /// Wait after each top-gate write, in ms
        #[arg(long, default_value = "0")]
        top_delay_ms: u64,
        /// First back-gate voltage (outer axis)
        #[arg(long, allow_negative_numbers = true)]
        back_start: f64,
        /// Last back-gate voltage
        #[arg(long, allow_negative_numbers = true)]
        back_stop: f64,
        /// Back-gate step
        #[arg(long)]
        back_step: f64,
        /// Wait after each back-gate write, in ms
        #[arg(long, default_value = "0")]
        back_delay_ms: u64,
        /// Measure every top-gate trace twice
        #[arg(long)]
        retrace: bool,
        /// Label appended to the measurement name
        #[arg(long)]
        label: Option<String>,
        /// Experiment the run belongs to
        #[arg(long)]
        experiment: Option<String>,
        /// Number of simulated lock-in amplifiers
        #[arg(long, default_value = "1")]
        lockins: usize,
        /// Refuse to run without a lock-in
        #[arg(long)]
        require_lockin: bool,
        /// Notes stored with the run
        #[arg(long)]
        notes: Option<String>,
        /// Output directory (overrides storage.output_dir)
        #[arg(long, short)]
        output_dir: Option<PathBuf>,
    },

    /// Summarise a recorded CSV run.
    Inspect {
        /// CSV run file
        path: PathBuf,
        /// Observable whose range is printed (defaults to the first)
        #[arg(long)]
        observable: Option<String>,
        /// real_and_imag, mag_and_phase, real, imag, mag or phase
        #[arg(long, default_value = "mag_and_phase")]
        part: String,
        /// degrees or radians
        #[arg(long, default_value = "degrees")]
        phase: String,
    },
}

fn simulated_station(lockins: usize) -> Station {
    let smu = Arc::new(MockSourceMeter::new());
    let mut station = Station::new();
    for i in 0..lockins {
        let name = format!("mf{}", i + 1);
        let lockin = MockLockIn::coupled(&smu, GateResponse::default()).named(name.clone());
        station.add(name, Component::LockIn(Arc::new(lockin)));
    }
    station
        .with("keithley", Component::SourceMeter(smu))
        .with("triton", Component::Cryostat(Arc::new(MockCryostat::new(0.012, 0.0))))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("failed to load configuration")?;
    tracing_init::init_from_config(&settings)?;

    match cli.command {
        Commands::GateMap {
            top_start,
            top_stop,
            top_step,
            top_delay_ms,
            back_start,
            back_stop,
            back_step,
            back_delay_ms,
            retrace,
            label,
            experiment,
            lockins,
            require_lockin,
            notes,
            output_dir,
        } => {
            let inner = generate_sweep_array(top_start, top_stop, top_step)
                .context("invalid top-gate range")?;
            let outer = generate_sweep_array(back_start, back_stop, back_step)
                .context("invalid back-gate range")?;
            let mut request = GateMapRequest::new(
                inner,
                Duration::from_millis(top_delay_ms),
                outer,
                Duration::from_millis(back_delay_ms),
            );
            request.label = label;
            request.experiment = experiment;
            request.retrace = Retrace::from(retrace);
            request.require_lockin = require_lockin;
            request.notes = notes;

            let station = simulated_station(lockins);
            info!(station = ?station, "Simulated station ready");
            if lockins > 0 {
                initialise_lockins(&station, &settings.lockin).await?;
            }

            let dir = output_dir.unwrap_or_else(|| settings.storage.output_dir.clone());
            let mut recorder = CsvRecorder::new(&dir);
            let run_id = gate_map(&station, &request, &settings, &mut recorder)
                .await
                .context("gate map failed")?;

            match recorder.last_path() {
                Some(path) => println!("run {run_id} written to {}", path.display()),
                None => println!("run {run_id} finished"),
            }
        }

        Commands::Inspect {
            path,
            observable,
            part,
            phase,
        } => {
            let projection =
                Projection::new(part.parse::<ComplexPart>()?, phase.parse::<PhaseUnit>()?);
            let dataset = load_csv_run(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let schema = &dataset.schema;

            println!("{}", dataset.plot_title());
            println!("status: {}", dataset.status.as_str());
            println!(
                "points: {} of {}",
                dataset.points.len(),
                schema.expected_points()
            );
            for (role, axis) in [("outer", &schema.outer), ("inner", &schema.inner)] {
                println!(
                    "{role}: {} [{}] {} points",
                    axis.name,
                    axis.unit,
                    axis.values.len()
                );
            }
            for observable in &schema.observables {
                println!(
                    "observable: {} [{}] {:?}",
                    observable.name, observable.unit, observable.kind
                );
            }
            for (name, value) in &dataset.metadata.environment {
                println!("environment: {name} = {value}");
            }

            let first = schema.observables.first().map(|o| o.name.clone());
            let Some(name) = observable.or(first) else {
                bail!("run has no observables");
            };
            for g in grid(&dataset, &name, projection, Direction::Forward)? {
                let g = g.rescaled();
                let finite: Vec<f64> = g.z.iter().copied().filter(|v| v.is_finite()).collect();
                if finite.is_empty() {
                    println!("{}: no data", g.z_label.name);
                    continue;
                }
                let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
                let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                println!("{}: {min:.4} .. {max:.4} {}", g.z_label.name, g.z_label.unit);
            }
        }
    }

    Ok(())
}
