//! Shared builders for the dispatch integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use hybrid_dispatch::domain::{BatteryParams, DispatchDecision, TimeGrid};
use hybrid_dispatch::optimizer::{
    DecisionSource, DispatchOptimizer, DispatchStrategy, DispatchWindow, GreedyStrategy, PlannedDispatch,
};
use hybrid_dispatch::simulation::{GenerationModel, LoadConfig, LoadModel, PlantProfiles, Simulator};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 21, 0, 0, 0).unwrap()
}

pub fn hourly_grid(steps: usize) -> TimeGrid {
    TimeGrid::uniform(t0(), Duration::hours(1), steps).unwrap()
}

/// Per-step wind, solar and demand aligned with an hourly grid.
pub fn profiles(wind_kw: Vec<f64>, solar_kw: Vec<f64>, demand_kw: Vec<f64>) -> Arc<PlantProfiles> {
    let grid = hourly_grid(demand_kw.len());
    let load = LoadModel::from_config(&LoadConfig::Profile { demand_kw }, &grid).unwrap();
    let generation = GenerationModel::Profile { wind_kw, solar_kw };
    Arc::new(PlantProfiles::new(grid, generation, load).unwrap())
}

pub fn battery(capacity_kwh: f64, initial: f64, min: f64, max: f64, rate_kw: f64, rte: f64) -> BatteryParams {
    BatteryParams {
        capacity_kwh,
        initial_soc_fraction: initial,
        min_soc_fraction: min,
        max_soc_fraction: max,
        max_charge_kw: rate_kw,
        max_discharge_kw: rate_kw,
        round_trip_efficiency: rte,
        ..BatteryParams::default()
    }
}

pub fn greedy() -> DispatchOptimizer {
    DispatchOptimizer::new(Arc::new(GreedyStrategy))
}

pub fn simulator(profiles: Arc<PlantProfiles>, battery: BatteryParams, optimizer: DispatchOptimizer) -> Simulator {
    Simulator::new(profiles, battery, optimizer).unwrap()
}

/// Greedy decisions, but cancels `token` while planning call number `cancel_on_call` (1-based).
pub struct CancellingStrategy {
    pub token: CancellationToken,
    pub cancel_on_call: usize,
    pub calls: AtomicUsize,
}

#[async_trait]
impl DispatchStrategy for CancellingStrategy {
    fn name(&self) -> &'static str {
        "cancelling"
    }

    async fn plan(&self, window: &DispatchWindow) -> PlannedDispatch {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_on_call {
            self.token.cancel();
        }
        PlannedDispatch {
            decision: GreedyStrategy::decide_window(window),
            source: DecisionSource::External,
            warning: None,
        }
    }
}

/// Greedy until `bad_step`, then returns `bad_decision`.
pub struct RogueStrategy {
    pub bad_step: usize,
    pub bad_decision: DispatchDecision,
}

#[async_trait]
impl DispatchStrategy for RogueStrategy {
    fn name(&self) -> &'static str {
        "rogue"
    }

    async fn plan(&self, window: &DispatchWindow) -> PlannedDispatch {
        let decision = if window.step == self.bad_step {
            self.bad_decision
        } else {
            GreedyStrategy::decide_window(window)
        };
        PlannedDispatch {
            decision,
            source: DecisionSource::External,
            warning: None,
        }
    }
}
