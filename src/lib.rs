//! Hybrid power plant dispatch engine.
//!
//! Wind and solar feed an HPC load through lossy feeders; a battery and the
//! utility grid cover the gap. Each timestep a dispatch strategy decides how
//! the battery and grid are used, and the simulator applies that decision
//! under the battery's physical limits.

pub mod config;
pub mod domain;
pub mod error;
pub mod optimizer;
pub mod power_flow;
pub mod simulation;
pub mod telemetry;
