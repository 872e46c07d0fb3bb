//! Plot preparation for recorded runs.
//!
//! Nothing here renders; it turns a [`Dataset`](crate::data::Dataset) into
//! real-valued grids and traces with SI-prefixed axes and a run title, for any
//! plotting front end to draw.

pub mod complex;
pub mod grid;
pub mod units;

pub use complex::{project, ComplexPart, Component, ComponentKind, PhaseUnit};
pub use grid::{grid, plot_title, trace, AxisLabel, Grid2d, Projection, Trace};
pub use units::{rescale, Rescaled};
