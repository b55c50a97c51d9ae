use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BatteryState, DispatchDecision};

/// Absolute balance tolerance per kW of flow through the bus.
pub const BALANCE_TOLERANCE: f64 = 1e-6;

/// Bus-side power flows of one applied step.
///
/// Power balance equation: inflow + discharge + grid = demand + charge + curtailed
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerSnapshot {
    pub timestamp: DateTime<Utc>,

    /// Renewable inflow after losses
    pub net_inflow_kw: f64,

    pub demand_kw: f64,

    /// Power delivered to the bus by the battery (after discharge losses)
    pub battery_discharge_kw: f64,

    /// Power taken from the bus by the battery (before charge losses)
    pub battery_charge_kw: f64,

    pub grid_kw: f64,

    pub curtailed_kw: f64,
}

impl PowerSnapshot {
    /// Bus view of `decision`, converting storage-side battery rates with the battery's efficiencies.
    pub fn from_decision(
        timestamp: DateTime<Utc>,
        net_inflow_kw: f64,
        demand_kw: f64,
        decision: &DispatchDecision,
        battery: &BatteryState,
    ) -> Self {
        Self {
            timestamp,
            net_inflow_kw,
            demand_kw,
            battery_discharge_kw: decision.battery_discharge_kw * battery.discharge_efficiency,
            battery_charge_kw: decision.battery_charge_kw / battery.charge_efficiency,
            grid_kw: decision.grid_draw_kw,
            curtailed_kw: decision.curtailed_kw,
        }
    }

    /// Sources minus sinks; zero when the step balances.
    pub fn residual_kw(&self) -> f64 {
        let sources = self.net_inflow_kw + self.battery_discharge_kw + self.grid_kw;
        let sinks = self.demand_kw + self.battery_charge_kw + self.curtailed_kw;
        sources - sinks
    }

    /// Verify power balance holds (sources = sinks), scaled to the flows involved.
    pub fn verify_power_balance(&self) -> bool {
        let scale = self
            .net_inflow_kw
            .max(self.demand_kw)
            .max(self.grid_kw)
            .max(1.0);
        self.residual_kw().abs() <= BALANCE_TOLERANCE * scale
    }

    /// Renewable power that ended up serving demand or charging the battery.
    pub fn renewable_used_kw(&self) -> f64 {
        (self.net_inflow_kw - self.curtailed_kw).max(0.0)
    }

    /// Share of demand not served by the grid (0-1).
    pub fn self_sufficiency_ratio(&self) -> f64 {
        // Treat loads below 10 W as no load
        const MIN_LOAD_THRESHOLD_KW: f64 = 0.01;
        if self.demand_kw < MIN_LOAD_THRESHOLD_KW {
            return 1.0;
        }
        (1.0 - self.grid_kw / self.demand_kw).clamp(0.0, 1.0)
    }
}
