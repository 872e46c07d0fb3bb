//! 2D grids and 1D traces extracted from recorded datasets, ready for plotting.

use chrono::{DateTime, Utc};
use std::fmt;

use super::complex::{project, ComplexPart, ComponentKind, PhaseUnit};
use super::units::rescale;
use crate::data::{Dataset, Direction, ObservableInfo, RunId};
use crate::error::{AppResult, DaqError};
use crate::instrument::ObservableKind;

/// How a possibly complex observable is turned into real components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Projection {
    /// Component(s) to extract.
    pub part: ComplexPart,
    /// Unit of phase components.
    pub phase: PhaseUnit,
}

impl Projection {
    /// Projection with the given part and phase unit.
    pub fn new(part: ComplexPart, phase: PhaseUnit) -> Self {
        Self { part, phase }
    }
}

/// Axis label: parameter name and unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisLabel {
    /// Parameter name.
    pub name: String,
    /// Unit, possibly SI-prefixed after rescaling.
    pub unit: String,
}

impl fmt::Display for AxisLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} ({})", self.name, self.unit)
        }
    }
}

/// An outer × inner matrix of one projected component.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2d {
    /// Inner-axis setpoints (columns).
    pub x: Vec<f64>,
    /// Outer-axis setpoints (rows).
    pub y: Vec<f64>,
    /// Row-major values, `NaN` where no point was recorded.
    pub z: Vec<f64>,
    /// Inner-axis label.
    pub x_label: AxisLabel,
    /// Outer-axis label.
    pub y_label: AxisLabel,
    /// Value label.
    pub z_label: AxisLabel,
}

impl Grid2d {
    /// Value at `(row, column)`.
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        if column >= self.x.len() {
            return None;
        }
        self.z.get(row * self.x.len() + column).copied()
    }

    /// Scale x, y and z by constant factors.
    pub fn multiply_by(mut self, factors: [f64; 3]) -> Self {
        let [fx, fy, fz] = factors;
        self.x.iter_mut().for_each(|v| *v *= fx);
        self.y.iter_mut().for_each(|v| *v *= fy);
        self.z.iter_mut().for_each(|v| *v *= fz);
        self
    }

    /// SI-prefix every axis so its largest magnitude lies in `[1, 1000)`.
    pub fn rescaled(mut self) -> Self {
        rescale_axis(&mut self.x, &mut self.x_label);
        rescale_axis(&mut self.y, &mut self.y_label);
        rescale_axis(&mut self.z, &mut self.z_label);
        self
    }
}

/// A 1D trace of one projected component, sorted by the inner setpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Inner-axis setpoints, ascending.
    pub x: Vec<f64>,
    /// Values.
    pub y: Vec<f64>,
    /// Inner-axis label.
    pub x_label: AxisLabel,
    /// Value label.
    pub y_label: AxisLabel,
}

impl Trace {
    /// Scale x and y by constant factors.
    pub fn multiply_by(mut self, factors: [f64; 2]) -> Self {
        let [fx, fy] = factors;
        self.x.iter_mut().for_each(|v| *v *= fx);
        self.y.iter_mut().for_each(|v| *v *= fy);
        self
    }

    /// SI-prefix both axes.
    pub fn rescaled(mut self) -> Self {
        rescale_axis(&mut self.x, &mut self.x_label);
        rescale_axis(&mut self.y, &mut self.y_label);
        self
    }
}

fn rescale_axis(values: &mut [f64], label: &mut AxisLabel) {
    let rescaled = rescale(values, &label.unit);
    rescaled.apply(values);
    label.unit = rescaled.unit;
}

fn observable<'a>(dataset: &'a Dataset, name: &str) -> AppResult<(usize, &'a ObservableInfo)> {
    dataset
        .schema
        .observable_index(name)
        .and_then(|i| dataset.schema.observables.get(i).map(|o| (i, o)))
        .ok_or_else(|| {
            let available: Vec<&str> = dataset
                .schema
                .observables
                .iter()
                .map(|o| o.name.as_str())
                .collect();
            DaqError::Configuration(format!(
                "observable '{name}' not in run {}, expected one of {available:?}",
                dataset.run_id
            ))
        })
}

fn components(
    info: &ObservableInfo,
    projection: Projection,
) -> AppResult<Vec<(ComponentKind, AxisLabel)>> {
    if info.kind == ObservableKind::Scalar && projection.part.needs_imaginary() {
        return Err(DaqError::NoImaginaryPart(info.name.clone()));
    }
    let kinds = match (info.kind, projection.part) {
        (ObservableKind::Scalar, _) => vec![ComponentKind::Real],
        (_, ComplexPart::RealAndImag) => vec![ComponentKind::Real, ComponentKind::Imag],
        (_, ComplexPart::MagAndPhase) => vec![ComponentKind::Mag, ComponentKind::Phase],
        (_, ComplexPart::Real) => vec![ComponentKind::Real],
        (_, ComplexPart::Imag) => vec![ComponentKind::Imag],
        (_, ComplexPart::Mag) => vec![ComponentKind::Mag],
        (_, ComplexPart::Phase) => vec![ComponentKind::Phase],
    };
    Ok(kinds
        .into_iter()
        .map(|kind| {
            let name = match info.kind {
                ObservableKind::Scalar => info.name.clone(),
                ObservableKind::Demod => format!("{}_{}", info.name, kind.suffix()),
            };
            let label = AxisLabel {
                name,
                unit: kind.unit(&info.unit, projection.phase).to_string(),
            };
            (kind, label)
        })
        .collect())
}

/// Outer × inner grids of `observable` for one pass direction, one grid per
/// projected component.
///
/// Points missing from an aborted run are `NaN`.
pub fn grid(
    dataset: &Dataset,
    observable_name: &str,
    projection: Projection,
    direction: Direction,
) -> AppResult<Vec<Grid2d>> {
    let (index, info) = observable(dataset, observable_name)?;
    let schema = &dataset.schema;
    let columns = schema.inner.values.len();
    let rows = schema.outer.values.len();

    let mut grids: Vec<Grid2d> = components(info, projection)?
        .into_iter()
        .map(|(_, z_label)| Grid2d {
            x: schema.inner.values.clone(),
            y: schema.outer.values.clone(),
            z: vec![f64::NAN; rows * columns],
            x_label: AxisLabel {
                name: schema.inner.name.clone(),
                unit: schema.inner.unit.clone(),
            },
            y_label: AxisLabel {
                name: schema.outer.name.clone(),
                unit: schema.outer.unit.clone(),
            },
            z_label,
        })
        .collect();

    for point in dataset.points.iter().filter(|p| p.direction == direction) {
        if point.outer_index >= rows || point.inner_index >= columns {
            return Err(DaqError::Storage(format!(
                "point ({}, {}) outside the {rows}x{columns} grid of run {}",
                point.outer_index, point.inner_index, dataset.run_id
            )));
        }
        let reading = point.readings.get(index).ok_or_else(|| {
            DaqError::Storage(format!("point without a reading for '{observable_name}'"))
        })?;
        let cell = point.outer_index * columns + point.inner_index;
        for (grid, component) in grids
            .iter_mut()
            .zip(project(reading, projection.part, projection.phase)?)
        {
            grid.z[cell] = component.value;
        }
    }
    Ok(grids)
}

/// Traces of `observable` along the inner axis at row `outer_index`, one per
/// projected component, sorted by the inner setpoint.
pub fn trace(
    dataset: &Dataset,
    observable_name: &str,
    projection: Projection,
    outer_index: usize,
    direction: Direction,
) -> AppResult<Vec<Trace>> {
    let (index, info) = observable(dataset, observable_name)?;
    let schema = &dataset.schema;
    if outer_index >= schema.outer.values.len() {
        return Err(DaqError::Configuration(format!(
            "row {outer_index} outside run {} with {} rows",
            dataset.run_id,
            schema.outer.values.len()
        )));
    }

    let mut rows: Vec<(f64, Vec<f64>)> = Vec::new();
    for point in dataset
        .points
        .iter()
        .filter(|p| p.direction == direction && p.outer_index == outer_index)
    {
        let reading = point.readings.get(index).ok_or_else(|| {
            DaqError::Storage(format!("point without a reading for '{observable_name}'"))
        })?;
        let values = project(reading, projection.part, projection.phase)?
            .into_iter()
            .map(|c| c.value)
            .collect();
        rows.push((point.inner, values));
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));

    let x: Vec<f64> = rows.iter().map(|(x, _)| *x).collect();
    let x_label = AxisLabel {
        name: schema.inner.name.clone(),
        unit: schema.inner.unit.clone(),
    };
    Ok(components(info, projection)?
        .into_iter()
        .enumerate()
        .map(|(i, (_, y_label))| Trace {
            x: x.clone(),
            y: rows
                .iter()
                .map(|(_, values)| values.get(i).copied().unwrap_or(f64::NAN))
                .collect(),
            x_label: x_label.clone(),
            y_label,
        })
        .collect())
}

/// Plot title: `[ #3: gate map test - 2026-10-19 14:03:12 ]`.
pub fn plot_title(run_id: RunId, name: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "[ {run_id}: {name} - {} ]",
        timestamp.format("%Y-%m-%d %H:%M:%S")
    )
}

impl Dataset {
    /// [`plot_title`] of this run.
    pub fn plot_title(&self) -> String {
        plot_title(self.run_id, &self.schema.measurement_name, self.started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AxisInfo, DatasetSchema, RunStatus, SweepPoint};
    use crate::instrument::{DemodSample, Reading};
    use crate::metadata::Metadata;
    use chrono::TimeZone;

    fn dataset(points: Vec<SweepPoint>) -> Dataset {
        Dataset {
            run_id: RunId::new(3),
            schema: DatasetSchema {
                measurement_name: "gate map test".into(),
                experiment: None,
                outer: AxisInfo {
                    name: "smub_volt".into(),
                    unit: "V".into(),
                    values: vec![0.0, 1.0],
                },
                inner: AxisInfo {
                    name: "smua_volt".into(),
                    unit: "V".into(),
                    values: vec![0.2, 0.1, 0.0],
                },
                observables: vec![
                    ObservableInfo {
                        name: "mf1_demod0_sample".into(),
                        unit: "V".into(),
                        kind: ObservableKind::Demod,
                    },
                    ObservableInfo {
                        name: "smua_curr".into(),
                        unit: "A".into(),
                        kind: ObservableKind::Scalar,
                    },
                ],
                retrace: false,
            },
            metadata: Metadata::default(),
            started: Utc.with_ymd_and_hms(2026, 10, 19, 14, 3, 12).unwrap(),
            status: RunStatus::Aborted,
            points,
        }
    }

    fn point(outer_index: usize, inner_index: usize, x: f64, current: f64) -> SweepPoint {
        SweepPoint {
            outer_index,
            inner_index,
            outer: [0.0, 1.0][outer_index],
            inner: [0.2, 0.1, 0.0][inner_index],
            direction: Direction::Forward,
            readings: vec![
                Reading::Demod(DemodSample {
                    x,
                    y: 0.0,
                    frequency: 127.0,
                }),
                Reading::scalar(current),
            ],
        }
    }

    fn partial_run() -> Dataset {
        dataset(vec![
            point(0, 0, 1e-3, 1e-12),
            point(0, 1, 2e-3, 2e-12),
            point(0, 2, 3e-3, 3e-12),
            point(1, 0, 4e-3, 4e-12),
        ])
    }

    #[test]
    fn grid_fills_missing_points_with_nan() {
        let grids = grid(
            &partial_run(),
            "mf1_demod0_sample",
            Projection::new(ComplexPart::Real, PhaseUnit::Degrees),
            Direction::Forward,
        )
        .unwrap();
        assert_eq!(grids.len(), 1);
        let g = &grids[0];
        assert_eq!(g.z.len(), 6);
        assert_eq!(g.get(0, 1), Some(2e-3));
        assert_eq!(g.get(1, 0), Some(4e-3));
        assert!(g.get(1, 2).unwrap().is_nan());
        assert_eq!(g.z_label.name, "mf1_demod0_sample_real");
    }

    #[test]
    fn mag_and_phase_gives_two_grids() {
        let grids = grid(
            &partial_run(),
            "mf1_demod0_sample",
            Projection::default(),
            Direction::Forward,
        )
        .unwrap();
        assert_eq!(grids.len(), 2);
        assert_eq!(grids[1].z_label.unit, "deg");
        assert_eq!(grids[1].get(0, 0), Some(0.0));
    }

    #[test]
    fn grid_rescale_and_multiply() {
        let grids = grid(
            &partial_run(),
            "smua_curr",
            Projection::new(ComplexPart::Real, PhaseUnit::Degrees),
            Direction::Forward,
        )
        .unwrap();
        let g = grids[0].clone().multiply_by([1.0, 1.0, -1.0]).rescaled();
        assert_eq!(g.z_label.to_string(), "smua_curr (pA)");
        assert_eq!(g.x_label.unit, "mV");
        assert!((g.get(0, 2).unwrap() + 3.0).abs() < 1e-9);
    }

    #[test]
    fn scalar_imaginary_part_is_rejected() {
        let result = grid(
            &partial_run(),
            "smua_curr",
            Projection::new(ComplexPart::Phase, PhaseUnit::Degrees),
            Direction::Forward,
        );
        assert!(matches!(result, Err(DaqError::NoImaginaryPart(name)) if name == "smua_curr"));
    }

    #[test]
    fn unknown_observable() {
        let result = grid(
            &partial_run(),
            "triton_T8",
            Projection::default(),
            Direction::Forward,
        );
        assert!(matches!(result, Err(DaqError::Configuration(_))));
    }

    #[test]
    fn trace_is_sorted_by_inner_value() {
        let traces = trace(
            &partial_run(),
            "mf1_demod0_sample",
            Projection::new(ComplexPart::Mag, PhaseUnit::Degrees),
            0,
            Direction::Forward,
        )
        .unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].x, vec![0.0, 0.1, 0.2]);
        assert_eq!(traces[0].y, vec![3e-3, 2e-3, 1e-3]);

        let traces = trace(
            &partial_run(),
            "mf1_demod0_sample",
            Projection::default(),
            5,
            Direction::Forward,
        );
        assert!(traces.is_err());
    }

    #[test]
    fn title() {
        assert_eq!(
            partial_run().plot_title(),
            "[ #3: gate map test - 2026-10-19 14:03:12 ]"
        );
    }
}
