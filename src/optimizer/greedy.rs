use async_trait::async_trait;

use super::{DecisionSource, DispatchStrategy, DispatchWindow, PlannedDispatch};
use crate::domain::{BatteryState, DispatchDecision, FLOW_EPSILON_KW};

/// Single-step rule-based dispatch, no lookahead:
/// 1. serve demand from net renewable inflow
/// 2. surplus charges the battery up to its acceptance, the rest is curtailed
/// 3. a shortfall is covered by the battery up to its available energy
/// 4. whatever is left comes from the grid
///
/// When inflow exactly matches demand the battery stays idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyStrategy;

impl GreedyStrategy {
    pub fn decide(net_inflow_kw: f64, demand_kw: f64, dt_hours: f64, battery: &BatteryState) -> DispatchDecision {
        let surplus = net_inflow_kw - demand_kw;

        if surplus > FLOW_EPSILON_KW {
            let bus_charge = surplus.min(battery.charge_acceptance_kw(dt_hours));
            if bus_charge <= FLOW_EPSILON_KW {
                return DispatchDecision {
                    curtailed_kw: surplus,
                    ..DispatchDecision::idle()
                };
            }
            return DispatchDecision {
                grid_draw_kw: 0.0,
                battery_charge_kw: bus_charge * battery.charge_efficiency,
                battery_discharge_kw: 0.0,
                curtailed_kw: (surplus - bus_charge).max(0.0),
            };
        }

        if surplus < -FLOW_EPSILON_KW {
            let shortfall = -surplus;
            let draw = (shortfall / battery.discharge_efficiency).min(battery.available_discharge_kw(dt_hours));
            if draw <= FLOW_EPSILON_KW {
                return DispatchDecision {
                    grid_draw_kw: shortfall,
                    ..DispatchDecision::idle()
                };
            }
            let remaining = shortfall - draw * battery.discharge_efficiency;
            return DispatchDecision {
                grid_draw_kw: if remaining > FLOW_EPSILON_KW { remaining } else { 0.0 },
                battery_charge_kw: 0.0,
                battery_discharge_kw: draw,
                curtailed_kw: 0.0,
            };
        }

        DispatchDecision::idle()
    }

    pub fn decide_window(window: &DispatchWindow) -> DispatchDecision {
        Self::decide(window.inflow(), window.demand(), window.dt(), &window.battery)
    }
}

#[async_trait]
impl DispatchStrategy for GreedyStrategy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    async fn plan(&self, window: &DispatchWindow) -> PlannedDispatch {
        PlannedDispatch {
            decision: Self::decide_window(window),
            source: DecisionSource::Greedy,
            warning: None,
        }
    }
}
