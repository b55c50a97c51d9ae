//! Error taxonomy for the dispatch engine.
//!
//! Configuration-time errors (`ProfileError`, `LossParameterError`,
//! `BatteryConfigError`, invalid dispatch settings) are raised before any
//! simulation state exists. `InfeasibleDispatchError` is recoverable and only
//! ever ends up as a warning inside a `SimulationResult`. `BatteryInvariantViolation`
//! and an unresolved `DataGapError` abort a run, but the partial result is
//! handed back through `RunAborted`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::simulation::SimulationResult;

/// Malformed or inconsistent generation/load configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("requested time range is empty")]
    EmptyRange,

    #[error("time step must be positive, got {0} ms")]
    NonPositiveStep(i64),

    #[error("{parameter} must be non-negative, got {value}")]
    Negative { parameter: &'static str, value: f64 },

    #[error("{parameter} is not finite: {value}")]
    NonFinite { parameter: &'static str, value: f64 },

    #[error("{parameter} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("timestamps must be strictly increasing (offending index {index})")]
    NonMonotonic { index: usize },

    #[error("profile '{profile}' has {actual} samples but the time range needs {expected}")]
    LengthMismatch {
        profile: String,
        expected: usize,
        actual: usize,
    },
}

/// Invalid loss coefficients or resistive parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LossParameterError {
    #[error("loss fraction '{stage}' must lie in [0, 1), got {value}")]
    FractionOutOfRange { stage: String, value: f64 },

    #[error("resistance must be non-negative, got {0} ohm")]
    NegativeResistance(f64),

    #[error("current must be non-negative, got {0} A")]
    NegativeCurrent(f64),

    #[error("line voltage must be positive, got {0} V")]
    NonPositiveVoltage(f64),

    #[error("unsupported phase count {0} (expected 1 or 3)")]
    InvalidPhases(u8),

    #[error("conductor parameter '{parameter}' must be positive, got {value}")]
    InvalidConductor { parameter: &'static str, value: f64 },
}

/// Invalid battery parameters. Raised before a `BatteryModel` exists.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatteryConfigError {
    #[error("{parameter} must be a finite, non-negative number, got {value}")]
    Negative { parameter: &'static str, value: f64 },

    #[error("state-of-charge window [{min}, {max}] is not a sub-interval of [0, 1]")]
    InvalidSocWindow { min: f64, max: f64 },

    #[error("initial state of charge {initial} lies outside [{min}, {max}]")]
    InitialSocOutsideWindow { initial: f64, min: f64, max: f64 },

    #[error("round-trip efficiency must lie in (0, 1], got {0}")]
    EfficiencyOutOfRange(f64),
}

/// The horizon linear program could not produce a usable plan.
///
/// Always recoverable: the optimizer falls back to the greedy heuristic for the
/// affected step and records this as a warning.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InfeasibleDispatchError {
    #[error("horizon problem is infeasible")]
    Infeasible,

    #[error("horizon problem is unbounded")]
    Unbounded,

    #[error("solver did not finish within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("solver failed: {message}")]
    Solver { message: String },

    #[error("LP solver not compiled in (enable the 'optimization' feature)")]
    SolverUnavailable,

    #[error("solver task failed: {message}")]
    TaskFailed { message: String },
}

/// What went wrong inside the battery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViolationKind {
    SocOutOfBounds,
    SimultaneousChargeDischarge,
    InvalidRequest,
}

/// A state-of-charge bound (or a decision invariant) broke after a clamped
/// operation. This is an internal logic defect and is never corrected silently.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error(
    "battery invariant violated ({kind}) at step {step:?} ({timestamp:?}): requested {requested_kw:.6} kW, \
     actual {actual_kw:.6} kW, soc {soc_kwh:.6} kWh outside [{min_soc_kwh:.6}, {max_soc_kwh:.6}]"
)]
pub struct BatteryInvariantViolation {
    pub kind: ViolationKind,
    pub step: Option<usize>,
    pub timestamp: Option<DateTime<Utc>>,
    pub requested_kw: f64,
    pub actual_kw: f64,
    pub soc_kwh: f64,
    pub min_soc_kwh: f64,
    pub max_soc_kwh: f64,
}

impl BatteryInvariantViolation {
    /// Attach the timestep the violation happened at.
    pub fn at_step(mut self, step: usize, timestamp: DateTime<Utc>) -> Self {
        self.step = Some(step);
        self.timestamp = Some(timestamp);
        self
    }
}

/// A requested timestamp has no generation/load sample and no interpolation
/// policy could fill it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no '{series}' sample at {timestamp}")]
pub struct DataGapError {
    pub series: String,
    pub timestamp: DateTime<Utc>,
}

/// Umbrella error for building and running a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    LossParameter(#[from] LossParameterError),

    #[error(transparent)]
    BatteryConfig(#[from] BatteryConfigError),

    #[error("invalid dispatch configuration: {0}")]
    InvalidDispatch(String),

    #[error(transparent)]
    DataGap(#[from] DataGapError),

    #[error(transparent)]
    BatteryInvariant(#[from] BatteryInvariantViolation),

    #[error("energy balance violated at step {step} ({timestamp}): residual {residual_kw:.9} kW")]
    EnergyBalance {
        step: usize,
        timestamp: DateTime<Utc>,
        residual_kw: f64,
    },
}

impl SimulationError {
    /// True for errors that can only come from configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SimulationError::Profile(_)
                | SimulationError::LossParameter(_)
                | SimulationError::BatteryConfig(_)
                | SimulationError::InvalidDispatch(_)
        )
    }
}

/// A fatal per-step error stopped the run. `partial` holds everything
/// accumulated up to (not including) the failing step.
#[derive(Debug, Error)]
#[error("simulation aborted after {completed_steps} steps: {source}")]
pub struct RunAborted {
    pub source: SimulationError,
    pub completed_steps: usize,
    pub partial: Box<SimulationResult>,
}
