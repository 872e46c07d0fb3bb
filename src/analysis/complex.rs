//! Projection of readings onto real-valued plot components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppResult, DaqError};
use crate::instrument::Reading;

/// Which real-valued view of a (possibly complex) reading to plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexPart {
    /// In-phase and quadrature, two components.
    RealAndImag,
    /// Magnitude and phase, two components.
    #[default]
    MagAndPhase,
    /// In-phase only.
    Real,
    /// Quadrature only.
    Imag,
    /// Magnitude only.
    Mag,
    /// Phase only.
    Phase,
}

impl ComplexPart {
    /// Lowercase label, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexPart::RealAndImag => "real_and_imag",
            ComplexPart::MagAndPhase => "mag_and_phase",
            ComplexPart::Real => "real",
            ComplexPart::Imag => "imag",
            ComplexPart::Mag => "mag",
            ComplexPart::Phase => "phase",
        }
    }

    /// `true` if the view cannot be formed without an imaginary part.
    pub fn needs_imaginary(&self) -> bool {
        matches!(self, ComplexPart::Imag | ComplexPart::Phase)
    }
}

impl fmt::Display for ComplexPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplexPart {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real_and_imag" => Ok(ComplexPart::RealAndImag),
            "mag_and_phase" => Ok(ComplexPart::MagAndPhase),
            "real" => Ok(ComplexPart::Real),
            "imag" => Ok(ComplexPart::Imag),
            "mag" => Ok(ComplexPart::Mag),
            "phase" => Ok(ComplexPart::Phase),
            other => Err(DaqError::Configuration(format!(
                "invalid complex plot type '{other}', expected one of real_and_imag, \
                 mag_and_phase, real, imag, mag, phase"
            ))),
        }
    }
}

/// Unit of phase components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseUnit {
    /// Radians.
    Radians,
    /// Degrees.
    #[default]
    Degrees,
}

impl PhaseUnit {
    /// Unit string attached to phase components.
    pub fn unit(&self) -> &'static str {
        match self {
            PhaseUnit::Radians => "rad",
            PhaseUnit::Degrees => "deg",
        }
    }
}

impl FromStr for PhaseUnit {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "radians" => Ok(PhaseUnit::Radians),
            "degrees" => Ok(PhaseUnit::Degrees),
            other => Err(DaqError::Configuration(format!(
                "invalid complex plot phase '{other}', expected degrees or radians"
            ))),
        }
    }
}

/// What a projected component represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Real part (or the value of a scalar reading).
    Real,
    /// Imaginary part.
    Imag,
    /// Magnitude.
    Mag,
    /// Phase.
    Phase,
}

impl ComponentKind {
    /// Suffix appended to the observable name in labels.
    pub fn suffix(&self) -> &'static str {
        match self {
            ComponentKind::Real => "real",
            ComponentKind::Imag => "imag",
            ComponentKind::Mag => "mag",
            ComponentKind::Phase => "phase",
        }
    }

    /// Unit of the component given the observable's unit.
    pub fn unit<'a>(&self, observable_unit: &'a str, phase: PhaseUnit) -> &'a str {
        match self {
            ComponentKind::Phase => phase.unit(),
            _ => observable_unit,
        }
    }
}

/// One real-valued component of a projected reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    /// What the value represents.
    pub kind: ComponentKind,
    /// The value.
    pub value: f64,
}

/// Components of `reading` under `part`.
///
/// Scalar readings have no imaginary part: asking for `Imag` or `Phase` fails
/// with [`DaqError::NoImaginaryPart`], every other view yields the value itself.
pub fn project(
    reading: &Reading,
    part: ComplexPart,
    phase: PhaseUnit,
) -> AppResult<Vec<Component>> {
    let component = |kind, value| Component { kind, value };

    let Some(imag) = reading.imag() else {
        if part.needs_imaginary() {
            return Err(DaqError::NoImaginaryPart(format!(
                "scalar reading cannot be projected onto '{part}'"
            )));
        }
        return Ok(vec![component(ComponentKind::Real, reading.real())]);
    };

    let real = reading.real();
    let angle = imag.atan2(real);
    let angle = match phase {
        PhaseUnit::Radians => angle,
        PhaseUnit::Degrees => angle.to_degrees(),
    };
    let mag = reading.magnitude();

    Ok(match part {
        ComplexPart::RealAndImag => vec![
            component(ComponentKind::Real, real),
            component(ComponentKind::Imag, imag),
        ],
        ComplexPart::MagAndPhase => vec![
            component(ComponentKind::Mag, mag),
            component(ComponentKind::Phase, angle),
        ],
        ComplexPart::Real => vec![component(ComponentKind::Real, real)],
        ComplexPart::Imag => vec![component(ComponentKind::Imag, imag)],
        ComplexPart::Mag => vec![component(ComponentKind::Mag, mag)],
        ComplexPart::Phase => vec![component(ComponentKind::Phase, angle)],
    })
}
