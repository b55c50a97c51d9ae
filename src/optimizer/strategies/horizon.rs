//! Receding-Horizon Dispatch
//!
//! Solves the next H steps as one program, applies only the first step, and
//! re-solves at the next step from the realized battery state. Solves run on
//! the blocking pool under a timeout; any failure falls back to the greedy
//! rule for that step and is reported as a warning.

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{DispatchDecision, FLOW_EPSILON_KW};
use crate::error::InfeasibleDispatchError;
use crate::optimizer::{
    DecisionSource, DispatchConstraints, DispatchStrategy, DispatchWindow, GreedyStrategy, PlannedDispatch,
};

/// Input to a horizon solve. Battery charge/discharge variables are bus-side.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonProblem {
    pub dt_hours: Vec<f64>,
    pub net_inflow_kw: Vec<f64>,
    pub demand_kw: Vec<f64>,
    pub grid_price: Vec<f64>,
    pub initial_soc_kwh: f64,
    pub min_soc_kwh: f64,
    pub max_soc_kwh: f64,
    /// Bus-side charge limit
    pub max_charge_kw: f64,
    /// Storage-side discharge limit
    pub max_discharge_kw: f64,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
    pub max_grid_import_kw: Option<f64>,
    pub throughput_penalty: f64,
    pub terminal_value_per_kwh: f64,
}

impl HorizonProblem {
    pub fn from_window(window: &DispatchWindow, constraints: &DispatchConstraints, horizon: usize) -> Self {
        let n = window.len().min(horizon.max(1));
        let battery = &window.battery;
        let grid_price = window.grid_price[..n].to_vec();
        let min_price = grid_price
            .iter()
            .copied()
            .map(OrderedFloat)
            .min()
            .map_or(0.0, |p| p.into_inner());
        let terminal_value_per_kwh = constraints
            .terminal_value_per_kwh
            .unwrap_or_else(|| 0.5 * min_price.max(0.0) * battery.discharge_efficiency);

        Self {
            dt_hours: window.dt_hours[..n].to_vec(),
            net_inflow_kw: window.net_inflow_kw[..n].to_vec(),
            demand_kw: window.demand_kw[..n].to_vec(),
            grid_price,
            initial_soc_kwh: battery.soc_kwh,
            min_soc_kwh: battery.min_soc_kwh,
            max_soc_kwh: battery.max_soc_kwh,
            max_charge_kw: battery.max_charge_kw,
            max_discharge_kw: battery.max_discharge_kw,
            charge_efficiency: battery.charge_efficiency,
            discharge_efficiency: battery.discharge_efficiency,
            max_grid_import_kw: constraints.max_grid_import_kw,
            throughput_penalty: constraints.throughput_penalty,
            terminal_value_per_kwh,
        }
    }

    pub fn len(&self) -> usize {
        self.dt_hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dt_hours.is_empty()
    }
}

/// Per-step solution of a horizon problem (bus-side battery flows).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HorizonPlan {
    pub grid_kw: Vec<f64>,
    pub charge_kw: Vec<f64>,
    pub discharge_kw: Vec<f64>,
    pub curtailed_kw: Vec<f64>,
    /// State of charge at the end of each step
    pub soc_kwh: Vec<f64>,
}

/// A blocking solver for horizon problems.
pub trait HorizonSolver: Send + Sync {
    fn solve(&self, problem: &HorizonProblem) -> Result<HorizonPlan, InfeasibleDispatchError>;
}

pub struct HorizonStrategy {
    solver: Arc<dyn HorizonSolver>,
    horizon_steps: usize,
    timeout: Duration,
    constraints: DispatchConstraints,
}

impl HorizonStrategy {
    pub fn new(
        solver: Arc<dyn HorizonSolver>,
        horizon_steps: usize,
        timeout: Duration,
        constraints: DispatchConstraints,
    ) -> Self {
        Self {
            solver,
            horizon_steps: horizon_steps.max(1),
            timeout,
            constraints,
        }
    }

    /// Solve on the blocking pool, giving up after `timeout`.
    ///
    /// A blocking task cannot be aborted: after a timeout the solve keeps its
    /// pool thread until the solver returns, and only its result is dropped.
    /// `LinearProgramSolver` problems are small, so each late solve still ends
    /// quickly; a solver that can hang should enforce its own time limit.
    async fn solve(&self, problem: HorizonProblem) -> Result<HorizonPlan, InfeasibleDispatchError> {
        let solver = Arc::clone(&self.solver);
        let task = tokio::task::spawn_blocking(move || solver.solve(&problem));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(InfeasibleDispatchError::TaskFailed {
                message: join_err.to_string(),
            }),
            Err(_) => Err(InfeasibleDispatchError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Turn the first step of `plan` into a decision the realized battery can execute.
    ///
    /// Simultaneous charge and discharge are netted, battery flows are clamped to the
    /// current limits, and grid/curtailment are re-settled from the balance identity.
    pub fn first_step(plan: &HorizonPlan, window: &DispatchWindow) -> Result<DispatchDecision, InfeasibleDispatchError> {
        let (Some(&charge), Some(&discharge)) = (plan.charge_kw.first(), plan.discharge_kw.first()) else {
            return Err(InfeasibleDispatchError::Solver {
                message: "solution has no first step".to_string(),
            });
        };
        if !charge.is_finite() || !discharge.is_finite() {
            return Err(InfeasibleDispatchError::Solver {
                message: "solution contains non-finite values".to_string(),
            });
        }

        let battery = &window.battery;
        let dt = window.dt();
        let net_bus = discharge.max(0.0) - charge.max(0.0);

        let (storage_charge, storage_discharge) = if net_bus > FLOW_EPSILON_KW {
            let draw = (net_bus / battery.discharge_efficiency).min(battery.available_discharge_kw(dt));
            (0.0, draw)
        } else if net_bus < -FLOW_EPSILON_KW {
            let bus = (-net_bus).min(battery.charge_acceptance_kw(dt));
            (bus * battery.charge_efficiency, 0.0)
        } else {
            (0.0, 0.0)
        };

        Ok(DispatchDecision::settle(
            window.inflow(),
            window.demand(),
            storage_charge,
            storage_discharge,
            battery.charge_efficiency,
            battery.discharge_efficiency,
        ))
    }

    fn fallback(window: &DispatchWindow, error: InfeasibleDispatchError) -> PlannedDispatch {
        warn!(step = window.step, timestamp = %window.timestamp(), error = %error, "horizon solve failed, using greedy dispatch");
        PlannedDispatch {
            decision: GreedyStrategy::decide_window(window),
            source: DecisionSource::GreedyFallback,
            warning: Some(error),
        }
    }
}

#[async_trait]
impl DispatchStrategy for HorizonStrategy {
    fn name(&self) -> &'static str {
        "horizon"
    }

    fn lookahead(&self) -> usize {
        self.horizon_steps
    }

    async fn plan(&self, window: &DispatchWindow) -> PlannedDispatch {
        let problem = HorizonProblem::from_window(window, &self.constraints, self.horizon_steps);
        debug!(step = window.step, horizon = problem.len(), "solving horizon problem");

        match self.solve(problem).await.and_then(|plan| Self::first_step(&plan, window)) {
            Ok(decision) => PlannedDispatch {
                decision,
                source: DecisionSource::Horizon,
                warning: None,
            },
            Err(error) => Self::fallback(window, error),
        }
    }
}
