use chrono::{DateTime, Utc};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::domain::{BatteryState, DispatchDecision};
use crate::error::InfeasibleDispatchError;
use crate::optimizer::DecisionSource;

/// One applied timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub dt_hours: f64,
    pub gross_wind_kw: f64,
    pub gross_solar_kw: f64,
    pub losses_kw: f64,
    pub net_inflow_kw: f64,
    pub demand_kw: f64,
    pub decision: DispatchDecision,
    pub source: DecisionSource,
    pub battery: BatteryState,
}

/// A recoverable per-step problem absorbed by a fallback policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchWarning {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub error: InfeasibleDispatchError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Termination {
    #[default]
    Completed,
    Cancelled,
    Aborted,
}

/// Emission factors (kg CO2 per MWh delivered).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionFactors {
    pub grid_kg_per_mwh: f64,
    pub renewable_kg_per_mwh: f64,
}

impl Default for EmissionFactors {
    fn default() -> Self {
        Self {
            grid_kg_per_mwh: 420.0,
            renewable_kg_per_mwh: 11.0,
        }
    }
}

/// Energy prices used for cost KPIs and as LP weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffConfig {
    /// Flat grid price per kWh
    pub grid_price_per_kwh: f64,
    /// Optional 24-value time-of-use grid price, hour 0 = midnight UTC
    pub hourly_grid_price: Option<Vec<f64>>,
    pub renewable_price_per_kwh: f64,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            grid_price_per_kwh: 0.08,
            hourly_grid_price: None,
            renewable_price_per_kwh: 0.02,
        }
    }
}

impl TariffConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.grid_price_per_kwh.is_finite() || self.grid_price_per_kwh < 0.0 {
            return Err(format!("grid_price_per_kwh must be non-negative, got {}", self.grid_price_per_kwh));
        }
        if !self.renewable_price_per_kwh.is_finite() || self.renewable_price_per_kwh < 0.0 {
            return Err(format!(
                "renewable_price_per_kwh must be non-negative, got {}",
                self.renewable_price_per_kwh
            ));
        }
        if let Some(hourly) = &self.hourly_grid_price {
            if hourly.len() != 24 {
                return Err(format!("hourly_grid_price needs 24 values, got {}", hourly.len()));
            }
            if hourly.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err("hourly_grid_price values must be non-negative".to_string());
            }
        }
        Ok(())
    }

    pub fn grid_price_at(&self, timestamp: DateTime<Utc>) -> f64 {
        use chrono::Timelike;
        match &self.hourly_grid_price {
            Some(hourly) => hourly
                .get(timestamp.hour() as usize)
                .copied()
                .unwrap_or(self.grid_price_per_kwh),
            None => self.grid_price_per_kwh,
        }
    }
}

/// Aggregate indicators over all recorded steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSummary {
    pub steps: usize,
    pub total_demand_kwh: f64,
    pub gross_generation_kwh: f64,
    pub losses_kwh: f64,
    pub net_inflow_kwh: f64,
    pub grid_energy_kwh: f64,
    pub curtailed_energy_kwh: f64,
    pub renewable_used_kwh: f64,
    /// Share of net renewable inflow that was not curtailed
    pub renewable_utilization: f64,
    /// Share of demand not served from the grid
    pub renewable_share_of_demand: f64,
    /// Energy put into storage (after charge losses)
    pub battery_charged_kwh: f64,
    /// Energy taken out of storage (before discharge losses)
    pub battery_discharged_kwh: f64,
    /// Equivalent full cycles
    pub battery_cycles: f64,
    /// Lowest and highest state of charge seen after any step
    pub soc_range_kwh: Option<(f64, f64)>,
    pub peak_grid_draw_kw: f64,
    pub optimizer_fallbacks: usize,
    pub grid_emissions_kg: f64,
    pub renewable_emissions_kg: f64,
    pub grid_cost: f64,
    pub renewable_cost: f64,
    /// What serving all demand from the grid would have cost
    pub grid_only_cost: f64,
}

impl KpiSummary {
    pub fn from_records(
        records: &[StepRecord],
        warnings: &[DispatchWarning],
        capacity_kwh: f64,
        tariff: &TariffConfig,
        emissions: &EmissionFactors,
    ) -> Self {
        let mut kpi = KpiSummary {
            steps: records.len(),
            optimizer_fallbacks: warnings.len(),
            ..Default::default()
        };

        for r in records {
            let dt = r.dt_hours;
            let price = tariff.grid_price_at(r.timestamp);
            let used = (r.net_inflow_kw - r.decision.curtailed_kw).max(0.0) * dt;

            kpi.total_demand_kwh += r.demand_kw * dt;
            kpi.gross_generation_kwh += (r.gross_wind_kw + r.gross_solar_kw) * dt;
            kpi.losses_kwh += r.losses_kw * dt;
            kpi.net_inflow_kwh += r.net_inflow_kw * dt;
            kpi.grid_energy_kwh += r.decision.grid_draw_kw * dt;
            kpi.curtailed_energy_kwh += r.decision.curtailed_kw * dt;
            kpi.renewable_used_kwh += used;
            kpi.battery_charged_kwh += r.decision.battery_charge_kw * dt;
            kpi.battery_discharged_kwh += r.decision.battery_discharge_kw * dt;
            kpi.grid_cost += r.decision.grid_draw_kw * dt * price;
            kpi.grid_only_cost += r.demand_kw * dt * price;
        }

        kpi.renewable_utilization = if kpi.net_inflow_kwh > 0.0 {
            kpi.renewable_used_kwh / kpi.net_inflow_kwh
        } else {
            0.0
        };
        kpi.renewable_share_of_demand = if kpi.total_demand_kwh > 0.0 {
            (1.0 - kpi.grid_energy_kwh / kpi.total_demand_kwh).clamp(0.0, 1.0)
        } else {
            0.0
        };
        kpi.battery_cycles = if capacity_kwh > 0.0 {
            kpi.battery_discharged_kwh / capacity_kwh
        } else {
            0.0
        };
        kpi.soc_range_kwh = records
            .iter()
            .map(|r| OrderedFloat(r.battery.soc_kwh))
            .minmax()
            .into_option()
            .map(|(lo, hi)| (lo.into_inner(), hi.into_inner()));
        kpi.peak_grid_draw_kw = records
            .iter()
            .map(|r| OrderedFloat(r.decision.grid_draw_kw))
            .max()
            .map_or(0.0, |p| p.into_inner());
        kpi.grid_emissions_kg = kpi.grid_energy_kwh / 1000.0 * emissions.grid_kg_per_mwh;
        kpi.renewable_emissions_kg = kpi.renewable_used_kwh / 1000.0 * emissions.renewable_kg_per_mwh;
        kpi.renewable_cost = kpi.renewable_used_kwh * tariff.renewable_price_per_kwh;
        kpi
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub records: Vec<StepRecord>,
    pub warnings: Vec<DispatchWarning>,
    pub kpis: KpiSummary,
    pub termination: Termination,
}

impl SimulationResult {
    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Completed
    }

    pub fn last_battery_state(&self) -> Option<&BatteryState> {
        self.records.last().map(|r| &r.battery)
    }
}
