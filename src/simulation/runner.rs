//! # Simulation Runner
//!
//! Walks the time grid strictly in order. Per step: pull generation and load,
//! net out losses, ask the optimizer for a decision, apply it to the battery,
//! verify the bus balance, record. Cancellation is honoured only between steps.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::generation::GenerationModel;
use super::load::LoadModel;
use super::result::{DispatchWarning, EmissionFactors, KpiSummary, SimulationResult, StepRecord, TariffConfig, Termination};
use crate::config::Config;
use crate::domain::{BatteryModel, BatteryParams, DispatchDecision, GenerationSample, TimeGrid};
use crate::error::{BatteryInvariantViolation, RunAborted, SimulationError, ViolationKind};
use crate::optimizer::{DispatchOptimizer, DispatchWindow};
use crate::power_flow::{LossConditions, LossModel, PowerSnapshot};

/// Read-only time grid and profiles, shared by reference between runs.
#[derive(Debug, Clone)]
pub struct PlantProfiles {
    pub grid: TimeGrid,
    pub generation: GenerationModel,
    pub load: LoadModel,
}

impl PlantProfiles {
    pub fn new(grid: TimeGrid, generation: GenerationModel, load: LoadModel) -> Result<Self, SimulationError> {
        generation.validate_for(&grid)?;
        Ok(Self { grid, generation, load })
    }
}

/// Generation and load of one step after losses.
#[derive(Debug, Clone, Copy)]
struct StepInputs {
    timestamp: DateTime<Utc>,
    dt_hours: f64,
    gross: GenerationSample,
    losses_kw: f64,
    net_inflow_kw: f64,
    demand_kw: f64,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    profiles: Arc<PlantProfiles>,
    wind_losses: LossModel,
    solar_losses: LossModel,
    battery: BatteryParams,
    optimizer: DispatchOptimizer,
    tariff: TariffConfig,
    emissions: EmissionFactors,
}

impl Simulator {
    /// Lossless plant with default tariff and emission factors.
    pub fn new(
        profiles: Arc<PlantProfiles>,
        battery: BatteryParams,
        optimizer: DispatchOptimizer,
    ) -> Result<Self, SimulationError> {
        battery.validate()?;
        Ok(Self {
            profiles,
            wind_losses: LossModel::lossless(),
            solar_losses: LossModel::lossless(),
            battery,
            optimizer,
            tariff: TariffConfig::default(),
            emissions: EmissionFactors::default(),
        })
    }

    /// Validate the whole configuration and build a simulator. No state exists until `run`.
    pub fn from_config(config: &Config) -> Result<Self, SimulationError> {
        let grid = config.simulation.time_grid()?;
        let generation = GenerationModel::from_config(&config.generation, &grid)?;
        let load = LoadModel::from_config(&config.load, &grid)?;
        let profiles = Arc::new(PlantProfiles::new(grid, generation, load)?);
        let optimizer = DispatchOptimizer::from_config(&config.dispatch)?;

        Self::new(profiles, config.battery, optimizer)?
            .with_losses(
                LossModel::from_config(&config.losses.wind)?,
                LossModel::from_config(&config.losses.solar)?,
            )
            .with_tariff(config.tariff.clone())
            .map(|sim| sim.with_emissions(config.emissions))
    }

    pub fn with_losses(mut self, wind: LossModel, solar: LossModel) -> Self {
        self.wind_losses = wind;
        self.solar_losses = solar;
        self
    }

    pub fn with_wind_losses(mut self, wind: LossModel) -> Self {
        self.wind_losses = wind;
        self
    }

    pub fn with_tariff(mut self, tariff: TariffConfig) -> Result<Self, SimulationError> {
        tariff.validate().map_err(SimulationError::InvalidDispatch)?;
        self.tariff = tariff;
        Ok(self)
    }

    pub fn with_emissions(mut self, emissions: EmissionFactors) -> Self {
        self.emissions = emissions;
        self
    }

    pub fn with_battery(mut self, battery: BatteryParams) -> Result<Self, SimulationError> {
        battery.validate()?;
        self.battery = battery;
        Ok(self)
    }

    pub fn with_optimizer(mut self, optimizer: DispatchOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn profiles(&self) -> &Arc<PlantProfiles> {
        &self.profiles
    }

    pub fn battery_params(&self) -> &BatteryParams {
        &self.battery
    }

    /// Execute the time loop. Each call starts from the configured initial battery state.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<SimulationResult, RunAborted> {
        let grid = &self.profiles.grid;
        let lookahead = self.optimizer.lookahead();

        let mut battery = match BatteryModel::new(&self.battery) {
            Ok(battery) => battery,
            Err(err) => {
                return Err(RunAborted {
                    source: err.into(),
                    completed_steps: 0,
                    partial: Box::new(self.finish(Vec::new(), Vec::new(), Termination::Aborted)),
                })
            }
        };

        info!(
            steps = grid.len(),
            strategy = self.optimizer.strategy.name(),
            capacity_kwh = self.battery.capacity_kwh,
            "simulation started"
        );

        let mut records = Vec::with_capacity(grid.len());
        let mut warnings = Vec::new();
        let mut termination = Termination::Completed;

        for step in 0..grid.len() {
            if cancel.is_cancelled() {
                info!(completed_steps = step, "simulation cancelled");
                termination = Termination::Cancelled;
                break;
            }

            match self.run_step(step, lookahead, &mut battery).await {
                Ok((record, warning)) => {
                    warnings.extend(warning);
                    records.push(record);
                }
                Err(source) => {
                    error!(step, error = %source, "simulation aborted");
                    let completed_steps = records.len();
                    return Err(RunAborted {
                        source,
                        completed_steps,
                        partial: Box::new(self.finish(records, warnings, Termination::Aborted)),
                    });
                }
            }
        }

        let result = self.finish(records, warnings, termination);
        info!(
            termination = %result.termination,
            grid_energy_kwh = result.kpis.grid_energy_kwh,
            curtailed_energy_kwh = result.kpis.curtailed_energy_kwh,
            renewable_utilization = result.kpis.renewable_utilization,
            battery_cycles = result.kpis.battery_cycles,
            fallbacks = result.kpis.optimizer_fallbacks,
            "simulation finished"
        );
        Ok(result)
    }

    async fn run_step(
        &self,
        step: usize,
        lookahead: usize,
        battery: &mut BatteryModel,
    ) -> Result<(StepRecord, Option<DispatchWarning>), SimulationError> {
        let current = self.step_inputs(step)?;
        let window = self.window(step, &current, lookahead, battery);
        trace!(step, horizon = window.len(), "dispatch window built");

        let planned = self.optimizer.plan(&window).await;
        let decision = apply_decision(step, &current, planned.decision, battery)?;

        let state = battery.state();
        let snapshot = PowerSnapshot::from_decision(
            current.timestamp,
            current.net_inflow_kw,
            current.demand_kw,
            &decision,
            &state,
        );
        if !snapshot.verify_power_balance() {
            return Err(SimulationError::EnergyBalance {
                step,
                timestamp: current.timestamp,
                residual_kw: snapshot.residual_kw(),
            });
        }

        debug!(
            step,
            inflow_kw = current.net_inflow_kw,
            demand_kw = current.demand_kw,
            grid_kw = decision.grid_draw_kw,
            charge_kw = decision.battery_charge_kw,
            discharge_kw = decision.battery_discharge_kw,
            curtailed_kw = decision.curtailed_kw,
            soc_kwh = state.soc_kwh,
            source = %planned.source,
            "step applied"
        );

        let warning = planned.warning.map(|error| DispatchWarning {
            step,
            timestamp: current.timestamp,
            error,
        });
        let record = StepRecord {
            step,
            timestamp: current.timestamp,
            dt_hours: current.dt_hours,
            gross_wind_kw: current.gross.wind_kw,
            gross_solar_kw: current.gross.solar_kw,
            losses_kw: current.losses_kw,
            net_inflow_kw: current.net_inflow_kw,
            demand_kw: current.demand_kw,
            decision,
            source: planned.source,
            battery: state,
        };
        Ok((record, warning))
    }

    fn step_inputs(&self, step: usize) -> Result<StepInputs, SimulationError> {
        let grid = &self.profiles.grid;
        let gross = self.profiles.generation.sample_at(grid, step)?;
        let demand_kw = self.profiles.load.demand(gross.timestamp)?;

        let conditions = LossConditions::default();
        let wind_net = self.wind_losses.apply(gross.wind_kw, &conditions)?;
        let solar_net = self.solar_losses.apply(gross.solar_kw, &conditions)?;
        let net_inflow_kw = wind_net + solar_net;

        Ok(StepInputs {
            timestamp: gross.timestamp,
            dt_hours: grid.dt_hours(step),
            gross,
            losses_kw: gross.total_kw() - net_inflow_kw,
            net_inflow_kw,
            demand_kw,
        })
    }

    /// The current step plus up to `lookahead - 1` future steps. Future steps
    /// with missing data end the window early instead of failing the step.
    fn window(&self, step: usize, current: &StepInputs, lookahead: usize, battery: &BatteryModel) -> DispatchWindow {
        let mut window = DispatchWindow {
            step,
            timestamps: vec![current.timestamp],
            dt_hours: vec![current.dt_hours],
            net_inflow_kw: vec![current.net_inflow_kw],
            demand_kw: vec![current.demand_kw],
            grid_price: vec![self.tariff.grid_price_at(current.timestamp)],
            battery: battery.state(),
        };

        let end = (step + lookahead).min(self.profiles.grid.len());
        for future in step + 1..end {
            match self.step_inputs(future) {
                Ok(inputs) => {
                    window.timestamps.push(inputs.timestamp);
                    window.dt_hours.push(inputs.dt_hours);
                    window.net_inflow_kw.push(inputs.net_inflow_kw);
                    window.demand_kw.push(inputs.demand_kw);
                    window.grid_price.push(self.tariff.grid_price_at(inputs.timestamp));
                }
                Err(err) => {
                    debug!(step, future, error = %err, "lookahead truncated");
                    break;
                }
            }
        }
        window
    }

    fn finish(&self, records: Vec<StepRecord>, warnings: Vec<DispatchWarning>, termination: Termination) -> SimulationResult {
        let kpis = KpiSummary::from_records(
            &records,
            &warnings,
            self.battery.capacity_kwh,
            &self.tariff,
            &self.emissions,
        );
        SimulationResult {
            records,
            warnings,
            kpis,
            termination,
        }
    }
}

/// Apply `proposed` to the battery and reconcile what it could not execute.
///
/// Refused charging power first backs off grid import, the rest is curtailed.
/// Undelivered discharge first absorbs curtailment, the rest comes from the grid.
fn apply_decision(
    step: usize,
    inputs: &StepInputs,
    proposed: DispatchDecision,
    battery: &mut BatteryModel,
) -> Result<DispatchDecision, SimulationError> {
    let state = battery.state();
    let reject = |kind: ViolationKind, requested_kw: f64| BatteryInvariantViolation {
        kind,
        step: Some(step),
        timestamp: Some(inputs.timestamp),
        requested_kw,
        actual_kw: 0.0,
        soc_kwh: state.soc_kwh,
        min_soc_kwh: state.min_soc_kwh,
        max_soc_kwh: state.max_soc_kwh,
    };

    if !proposed.is_finite_non_negative() {
        let requested = proposed.battery_charge_kw.max(proposed.battery_discharge_kw);
        return Err(reject(ViolationKind::InvalidRequest, requested).into());
    }
    if proposed.is_charging() && proposed.is_discharging() {
        return Err(reject(ViolationKind::SimultaneousChargeDischarge, proposed.battery_charge_kw).into());
    }

    let dt = inputs.dt_hours;
    let mut applied = proposed;

    if proposed.is_charging() {
        let offered = proposed.battery_charge_kw / state.charge_efficiency;
        let accepted = battery
            .charge(offered, dt)
            .map_err(|v| v.at_step(step, inputs.timestamp))?;
        let refused = (offered - accepted).max(0.0);
        let backed_off = refused.min(applied.grid_draw_kw);

        applied.battery_charge_kw = accepted * state.charge_efficiency;
        applied.battery_discharge_kw = 0.0;
        applied.grid_draw_kw -= backed_off;
        applied.curtailed_kw += refused - backed_off;
    } else if proposed.is_discharging() {
        let actual = battery
            .discharge(proposed.battery_discharge_kw, dt)
            .map_err(|v| v.at_step(step, inputs.timestamp))?;
        let undelivered = ((proposed.battery_discharge_kw - actual) * state.discharge_efficiency).max(0.0);
        let absorbed = undelivered.min(applied.curtailed_kw);

        applied.battery_discharge_kw = actual;
        applied.battery_charge_kw = 0.0;
        applied.curtailed_kw -= absorbed;
        applied.grid_draw_kw += undelivered - absorbed;
    } else {
        battery.idle();
        applied.battery_charge_kw = 0.0;
        applied.battery_discharge_kw = 0.0;
    }

    Ok(applied)
}
