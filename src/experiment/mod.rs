//! Measurement procedures built on the sweep engine.
//!
//! - [`gate_map`](gate_map::gate_map): safe approach followed by a 2D map of two gate voltages.
//! - [`initialise_lockins`]: reference/follower setup of every lock-in on the station.

pub mod gate_map;
pub mod lockin_setup;

pub use gate_map::{gate_map, GateMap, GateMapRequest, GateMapSettings};
pub use lockin_setup::{initialise_lockins, LockInSetup, LockInSummary};
