//! Core library for the meso_daq application.
//!
//! Gate-map sweeps and instrument orchestration for mesoscopic-physics
//! experiments. Instruments are reached through narrow capability traits
//! ([`instrument`]), moved safely by the position stepper and swept in 2D by
//! the orchestrator ([`sweep`]), and every measured point is handed to a
//! recorder ([`data`]). The [`experiment`] procedures tie these together and
//! [`analysis`] prepares recorded runs for plotting.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod instrument;
pub mod metadata;
pub mod sweep;
pub mod tracing_init;
