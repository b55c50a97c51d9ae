use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::DispatchConstraints;
use crate::domain::{BatteryState, DispatchDecision};
use crate::error::{InfeasibleDispatchError, SimulationError};

/// Everything a strategy may look at when deciding step `step`.
///
/// Index 0 is the step being decided; the rest is lookahead. Always non-empty.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchWindow {
    pub step: usize,
    pub timestamps: Vec<DateTime<Utc>>,
    pub dt_hours: Vec<f64>,
    /// Renewable inflow after losses
    pub net_inflow_kw: Vec<f64>,
    pub demand_kw: Vec<f64>,
    /// Grid price weight per step
    pub grid_price: Vec<f64>,
    /// Realized battery state at the start of `step`
    pub battery: BatteryState,
}

impl DispatchWindow {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamps[0]
    }

    pub fn dt(&self) -> f64 {
        self.dt_hours[0]
    }

    pub fn inflow(&self) -> f64 {
        self.net_inflow_kw[0]
    }

    pub fn demand(&self) -> f64 {
        self.demand_kw[0]
    }
}

/// Which path produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionSource {
    Greedy,
    Horizon,
    /// Horizon solve failed, greedy decision used instead
    GreedyFallback,
    /// A strategy supplied by the caller
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDispatch {
    pub decision: DispatchDecision,
    pub source: DecisionSource,
    /// Set when the strategy had to fall back
    pub warning: Option<InfeasibleDispatchError>,
}

/// A dispatch policy. Implementations never fail: solver trouble is absorbed
/// into a fallback decision plus a warning.
#[async_trait]
pub trait DispatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of steps (including the current one) the strategy wants to see.
    fn lookahead(&self) -> usize {
        1
    }

    async fn plan(&self, window: &DispatchWindow) -> PlannedDispatch;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Greedy,
    Horizon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub strategy: StrategyKind,
    /// Receding-horizon length in steps
    pub horizon_steps: usize,
    pub solver_timeout_ms: u64,
    #[serde(flatten)]
    pub constraints: DispatchConstraints,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Greedy,
            horizon_steps: 12,
            solver_timeout_ms: 2_000,
            constraints: DispatchConstraints::default(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.horizon_steps == 0 {
            return Err(SimulationError::InvalidDispatch(
                "horizon_steps must be at least 1".to_string(),
            ));
        }
        if self.solver_timeout_ms == 0 {
            return Err(SimulationError::InvalidDispatch(
                "solver_timeout_ms must be positive".to_string(),
            ));
        }
        self.constraints.validate().map_err(SimulationError::InvalidDispatch)
    }
}

/// Wraps the configured strategy for the simulator.
#[derive(Clone)]
pub struct DispatchOptimizer {
    pub strategy: Arc<dyn DispatchStrategy>,
}

impl std::fmt::Debug for DispatchOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchOptimizer")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl DispatchOptimizer {
    pub fn new(strategy: Arc<dyn DispatchStrategy>) -> Self {
        Self { strategy }
    }

    pub fn from_config(config: &DispatchConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let strategy: Arc<dyn DispatchStrategy> = match config.strategy {
            StrategyKind::Greedy => Arc::new(super::GreedyStrategy),
            StrategyKind::Horizon => Arc::new(super::HorizonStrategy::new(
                Arc::new(super::LinearProgramSolver),
                config.horizon_steps,
                std::time::Duration::from_millis(config.solver_timeout_ms),
                config.constraints.clone(),
            )),
        };
        Ok(Self { strategy })
    }

    pub fn lookahead(&self) -> usize {
        self.strategy.lookahead().max(1)
    }

    pub async fn plan(&self, window: &DispatchWindow) -> PlannedDispatch {
        self.strategy.plan(window).await
    }
}
