//! Linear Program for Horizon Dispatch
//!
//! Formulation over the next H steps (bus-side battery flows):
//! - grid[t]      in [0, max_grid_import]
//! - charge[t]    in [0, max_charge]
//! - discharge[t] in [0, max_discharge * eta_d]
//! - curtail[t]   in [0, inflow[t]]
//! - soc[t+1]     in [min_soc, max_soc]
//!
//! subject to the per-step energy balance
//! `inflow + discharge - charge + grid - curtail == demand` and the battery
//! recursion `soc[t+1] = soc[t] + charge*dt*eta_c - discharge*dt/eta_d`.
//!
//! Objective: minimise price-weighted grid energy plus a small throughput
//! penalty, minus the value of energy still stored at the end of the horizon.

use super::horizon::{HorizonPlan, HorizonProblem, HorizonSolver};
use crate::error::InfeasibleDispatchError;

/// `good_lp` solver using the pure-Rust minilp backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearProgramSolver;

impl HorizonSolver for LinearProgramSolver {
    #[cfg(feature = "optimization")]
    fn solve(&self, problem: &HorizonProblem) -> Result<HorizonPlan, InfeasibleDispatchError> {
        use good_lp::solvers::minilp::minilp;
        use good_lp::{constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel};

        let n = problem.len();
        if n == 0 {
            return Err(InfeasibleDispatchError::Solver {
                message: "empty horizon".to_string(),
            });
        }
        if problem.min_soc_kwh > problem.max_soc_kwh {
            return Err(InfeasibleDispatchError::Infeasible);
        }

        let mut vars = ProblemVariables::new();

        let grid_var = match problem.max_grid_import_kw {
            Some(limit) => variable().min(0.0).max(limit),
            None => variable().min(0.0),
        };
        let grid = vars.add_vector(grid_var, n);
        let charge = vars.add_vector(variable().min(0.0).max(problem.max_charge_kw), n);
        let discharge = vars.add_vector(
            variable()
                .min(0.0)
                .max(problem.max_discharge_kw * problem.discharge_efficiency),
            n,
        );
        let curtail: Vec<_> = problem
            .net_inflow_kw
            .iter()
            .map(|&inflow| vars.add(variable().min(0.0).max(inflow.max(0.0))))
            .collect();
        let soc_start = vars.add(variable());
        let soc = vars.add_vector(variable().min(problem.min_soc_kwh).max(problem.max_soc_kwh), n);

        let grid_cost: Expression = (0..n)
            .map(|t| grid[t] * (problem.grid_price[t] * problem.dt_hours[t]))
            .sum();
        let throughput: Expression = (0..n)
            .map(|t| (charge[t] + discharge[t]) * (problem.throughput_penalty * problem.dt_hours[t]))
            .sum();
        let objective = grid_cost + throughput - soc[n - 1] * problem.terminal_value_per_kwh;

        let mut model = vars
            .minimise(objective)
            .using(minilp)
            .with(constraint!(soc_start == problem.initial_soc_kwh));

        for t in 0..n {
            let dt = problem.dt_hours[t];
            let previous = if t == 0 { soc_start } else { soc[t - 1] };

            model = model.with(constraint!(
                grid[t] + discharge[t] - charge[t] - curtail[t] == problem.demand_kw[t] - problem.net_inflow_kw[t]
            ));
            model = model.with(constraint!(
                soc[t] == previous + charge[t] * (dt * problem.charge_efficiency)
                    - discharge[t] * (dt / problem.discharge_efficiency)
            ));
        }

        let solution = model.solve().map_err(|err| match err {
            ResolutionError::Infeasible => InfeasibleDispatchError::Infeasible,
            ResolutionError::Unbounded => InfeasibleDispatchError::Unbounded,
            other => InfeasibleDispatchError::Solver {
                message: other.to_string(),
            },
        })?;

        let values = |v: &[good_lp::Variable]| v.iter().map(|&x| solution.value(x)).collect::<Vec<f64>>();
        Ok(HorizonPlan {
            grid_kw: values(&grid),
            charge_kw: values(&charge),
            discharge_kw: values(&discharge),
            curtailed_kw: values(&curtail),
            soc_kwh: values(&soc),
        })
    }

    #[cfg(not(feature = "optimization"))]
    fn solve(&self, _problem: &HorizonProblem) -> Result<HorizonPlan, InfeasibleDispatchError> {
        Err(InfeasibleDispatchError::SolverUnavailable)
    }
}
