//! Scenario sweeps
//!
//! Independent runs execute concurrently on a `JoinSet`. Every run owns its
//! battery state; only the read-only profiles are shared.

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::result::SimulationResult;
use super::runner::Simulator;
use crate::domain::BatteryParams;
use crate::error::{RunAborted, SimulationError};
use crate::power_flow::{LossConfig, LossModel, COPPER_RESISTIVITY_OHM_M};

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub simulator: Simulator,
}

impl Scenario {
    pub fn new(name: impl Into<String>, simulator: Simulator) -> Self {
        Self {
            name: name.into(),
            simulator,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Aborted(#[from] RunAborted),

    #[error("scenario task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug)]
pub struct ScenarioOutcome {
    pub name: String,
    pub result: Result<SimulationResult, ScenarioError>,
}

/// Run all scenarios concurrently. Outcomes come back in input order.
pub async fn run_scenarios(scenarios: Vec<Scenario>, cancel: &CancellationToken) -> Vec<ScenarioOutcome> {
    let names: Vec<String> = scenarios.iter().map(|s| s.name.clone()).collect();
    let mut slots: Vec<Option<Result<SimulationResult, ScenarioError>>> = names.iter().map(|_| None).collect();

    info!(scenarios = names.len(), "starting scenario sweep");

    let mut tasks = JoinSet::new();
    for (index, scenario) in scenarios.into_iter().enumerate() {
        let token = cancel.child_token();
        tasks.spawn(async move {
            let result = scenario.simulator.run(&token).await;
            (index, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Err(aborted) = &result {
                    warn!(scenario = %names[index], error = %aborted, "scenario aborted");
                }
                slots[index] = Some(result.map_err(ScenarioError::from));
            }
            Err(err) => warn!(error = %err, "scenario task failed"),
        }
    }

    names
        .into_iter()
        .zip(slots)
        .map(|(name, slot)| ScenarioOutcome {
            name,
            result: slot.unwrap_or_else(|| Err(ScenarioError::TaskFailed("task did not complete".to_string()))),
        })
        .collect()
}

/// One scenario per battery capacity. Charge and discharge limits keep the
/// base C-rate.
pub fn battery_capacity_sweep(base: &Simulator, capacities_kwh: &[f64]) -> Result<Vec<Scenario>, SimulationError> {
    let params = *base.battery_params();
    let c_rate_charge = if params.capacity_kwh > 0.0 {
        params.max_charge_kw / params.capacity_kwh
    } else {
        0.0
    };
    let c_rate_discharge = if params.capacity_kwh > 0.0 {
        params.max_discharge_kw / params.capacity_kwh
    } else {
        0.0
    };

    capacities_kwh
        .iter()
        .map(|&capacity_kwh| -> Result<Scenario, SimulationError> {
            let battery = BatteryParams {
                capacity_kwh,
                max_charge_kw: capacity_kwh * c_rate_charge,
                max_discharge_kw: capacity_kwh * c_rate_discharge,
                ..params
            };
            let simulator = base.clone().with_battery(battery)?;
            Ok(Scenario::new(format!("battery_{capacity_kwh}kwh"), simulator))
        })
        .collect()
}

/// One scenario per wind feeder length, modelled as a copper conductor.
/// Solar losses are left as configured.
pub fn transmission_distance_sweep(
    base: &Simulator,
    distances_km: &[f64],
    line_voltage_v: f64,
    cross_section_mm2: f64,
) -> Result<Vec<Scenario>, SimulationError> {
    distances_km
        .iter()
        .map(|&length_km| -> Result<Scenario, SimulationError> {
            let wind = LossModel::from_config(&LossConfig::Conductor {
                length_km,
                line_voltage_v,
                cross_section_mm2,
                resistivity_ohm_m: COPPER_RESISTIVITY_OHM_M,
                phases: 3,
            })?;
            let simulator = base.clone().with_wind_losses(wind);
            Ok(Scenario::new(format!("feeder_{length_km}km"), simulator))
        })
        .collect()
}
