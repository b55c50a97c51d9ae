use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::battery::FLOW_EPSILON_KW;

/// Gross wind and solar output at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSample {
    pub timestamp: DateTime<Utc>,
    pub wind_kw: f64,
    pub solar_kw: f64,
}

impl GenerationSample {
    pub fn total_kw(&self) -> f64 {
        self.wind_kw + self.solar_kw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    pub timestamp: DateTime<Utc>,
    pub demand_kw: f64,
}

/// How supply is split for one step.
///
/// Battery fields are storage-side rates: the bus spends
/// `battery_charge_kw / charge_efficiency` to charge and receives
/// `battery_discharge_kw * discharge_efficiency` when discharging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchDecision {
    pub grid_draw_kw: f64,
    pub battery_charge_kw: f64,
    pub battery_discharge_kw: f64,
    pub curtailed_kw: f64,
}

impl DispatchDecision {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Fill grid draw or curtailment so the step balances, given the battery flows already chosen.
    pub fn settle(
        net_inflow_kw: f64,
        demand_kw: f64,
        battery_charge_kw: f64,
        battery_discharge_kw: f64,
        charge_efficiency: f64,
        discharge_efficiency: f64,
    ) -> Self {
        let residual = demand_kw - net_inflow_kw - battery_discharge_kw * discharge_efficiency
            + battery_charge_kw / charge_efficiency;
        let (grid_draw_kw, curtailed_kw) = if residual > FLOW_EPSILON_KW {
            (residual, 0.0)
        } else if residual < -FLOW_EPSILON_KW {
            (0.0, -residual)
        } else {
            (0.0, 0.0)
        };
        Self {
            grid_draw_kw,
            battery_charge_kw,
            battery_discharge_kw,
            curtailed_kw,
        }
    }

    /// `net_inflow + discharge*eta_d - charge/eta_c + grid - curtailed - demand`; zero when balanced.
    pub fn balance_residual_kw(
        &self,
        net_inflow_kw: f64,
        demand_kw: f64,
        charge_efficiency: f64,
        discharge_efficiency: f64,
    ) -> f64 {
        net_inflow_kw + self.battery_discharge_kw * discharge_efficiency
            - self.battery_charge_kw / charge_efficiency
            + self.grid_draw_kw
            - self.curtailed_kw
            - demand_kw
    }

    pub fn is_charging(&self) -> bool {
        self.battery_charge_kw > FLOW_EPSILON_KW
    }

    pub fn is_discharging(&self) -> bool {
        self.battery_discharge_kw > FLOW_EPSILON_KW
    }

    pub fn is_finite_non_negative(&self) -> bool {
        [
            self.grid_draw_kw,
            self.battery_charge_kw,
            self.battery_discharge_kw,
            self.curtailed_kw,
        ]
        .iter()
        .all(|v| v.is_finite() && *v >= 0.0)
    }
}
