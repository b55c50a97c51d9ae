//! Whole-run behaviour: cancellation, fatal aborts, data gaps and sweeps.

use approx::assert_relative_eq;
use chrono::Duration;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use hybrid_dispatch::config::Config;
use hybrid_dispatch::domain::{DispatchDecision, InterpolationPolicy, TimeSeries};
use hybrid_dispatch::error::{SimulationError, ViolationKind};
use hybrid_dispatch::optimizer::{DispatchConfig, DispatchOptimizer, StrategyKind};
use hybrid_dispatch::simulation::{
    battery_capacity_sweep, run_scenarios, transmission_distance_sweep, GenerationModel, LoadModel, PlantProfiles,
    Simulator, Termination,
};

use super::common::*;

fn default_simulator() -> Simulator {
    let config = Config::from_toml_str(include_str!("../../config/default.toml")).unwrap();
    Simulator::from_config(&config).unwrap()
}

/// Hourly wind readings with hour 3 missing.
fn gappy_profiles(interpolation: InterpolationPolicy) -> Arc<PlantProfiles> {
    let grid = hourly_grid(6);
    let wind = TimeSeries::from_pairs(
        [0, 1, 2, 4, 5]
            .into_iter()
            .map(|h| (t0() + Duration::hours(h), 100.0 + h as f64 * 10.0)),
    )
    .unwrap();
    let solar = TimeSeries::from_pairs(grid.timestamps().iter().map(|&ts| (ts, 0.0))).unwrap();
    let generation = GenerationModel::Measured {
        wind,
        solar,
        interpolation,
    };
    Arc::new(PlantProfiles::new(grid, generation, LoadModel::constant(150.0).unwrap()).unwrap())
}

#[tokio::test]
async fn test_cancellation_stops_at_step_boundary() {
    let token = CancellationToken::new();
    let strategy = CancellingStrategy {
        token: token.clone(),
        cancel_on_call: 3,
        calls: AtomicUsize::new(0),
    };
    let sim = simulator(
        profiles(vec![50.0; 10], vec![0.0; 10], vec![80.0; 10]),
        battery(100.0, 0.5, 0.1, 0.9, 20.0, 0.9025),
        DispatchOptimizer::new(Arc::new(strategy)),
    );

    let result = sim.run(&token).await.unwrap();

    // The step that observed the cancellation still completes
    assert_eq!(result.records.len(), 3);
    assert_eq!(result.termination, Termination::Cancelled);
    assert!(!result.is_complete());
    assert_eq!(result.kpis.steps, 3);
}

#[tokio::test]
async fn test_simultaneous_flows_abort_and_keep_partial_results() {
    let strategy = RogueStrategy {
        bad_step: 2,
        bad_decision: DispatchDecision {
            grid_draw_kw: 30.0,
            battery_charge_kw: 5.0,
            battery_discharge_kw: 5.0,
            curtailed_kw: 0.0,
        },
    };
    let sim = simulator(
        profiles(vec![50.0; 5], vec![0.0; 5], vec![80.0; 5]),
        battery(100.0, 0.5, 0.1, 0.9, 20.0, 0.9025),
        DispatchOptimizer::new(Arc::new(strategy)),
    );

    let aborted = sim.run(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(aborted.completed_steps, 2);
    assert_eq!(aborted.partial.records.len(), 2);
    assert_eq!(aborted.partial.termination, Termination::Aborted);
    match &aborted.source {
        SimulationError::BatteryInvariant(v) => {
            assert_eq!(v.kind, ViolationKind::SimultaneousChargeDischarge);
            assert_eq!(v.step, Some(2));
            assert_eq!(v.timestamp, Some(t0() + Duration::hours(2)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unbalanced_decision_aborts() {
    let strategy = RogueStrategy {
        bad_step: 0,
        bad_decision: DispatchDecision::idle(),
    };
    let sim = simulator(
        profiles(vec![0.0; 3], vec![0.0; 3], vec![80.0; 3]),
        battery(100.0, 0.5, 0.1, 0.9, 20.0, 0.9025),
        DispatchOptimizer::new(Arc::new(strategy)),
    );

    let aborted = sim.run(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(aborted.completed_steps, 0);
    match aborted.source {
        SimulationError::EnergyBalance { step, residual_kw, .. } => {
            assert_eq!(step, 0);
            assert_relative_eq!(residual_kw, -80.0, epsilon = 1e-9);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_data_gap_without_interpolation_is_fatal() {
    let sim = simulator(
        gappy_profiles(InterpolationPolicy::None),
        battery(100.0, 0.5, 0.1, 0.9, 20.0, 0.9025),
        greedy(),
    );

    let aborted = sim.run(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(aborted.completed_steps, 3);
    match aborted.source {
        SimulationError::DataGap(gap) => {
            assert_eq!(gap.series, "wind");
            assert_eq!(gap.timestamp, t0() + Duration::hours(3));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_linear_interpolation_bridges_the_gap() {
    let sim = simulator(
        gappy_profiles(InterpolationPolicy::Linear),
        battery(100.0, 0.5, 0.1, 0.9, 20.0, 0.9025),
        greedy(),
    );

    let result = sim.run(&CancellationToken::new()).await.unwrap();
    assert!(result.is_complete());
    assert_relative_eq!(result.records[3].gross_wind_kw, 130.0, epsilon = 1e-9);
}

#[tokio::test]
async fn test_gap_in_lookahead_only_shortens_the_window() {
    let optimizer = DispatchOptimizer::from_config(&DispatchConfig {
        strategy: StrategyKind::Horizon,
        horizon_steps: 6,
        ..Default::default()
    })
    .unwrap();
    let sim = simulator(
        gappy_profiles(InterpolationPolicy::None),
        battery(100.0, 0.5, 0.1, 0.9, 20.0, 0.9025),
        optimizer,
    );

    // Steps 0..=2 see hour 3 in their lookahead; only step 3 itself is fatal
    let aborted = sim.run(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(aborted.completed_steps, 3);
    assert!(matches!(aborted.source, SimulationError::DataGap(_)));
}

#[tokio::test]
async fn test_default_scenario_is_deterministic() {
    let sim = default_simulator();
    let first = sim.run(&CancellationToken::new()).await.unwrap();
    let second = sim.run(&CancellationToken::new()).await.unwrap();

    assert!(first.is_complete());
    assert_eq!(first.records.len(), 168);
    assert_eq!(first, second);
    assert!((0.0..=1.0).contains(&first.kpis.renewable_utilization));
    assert!(first.kpis.losses_kwh > 0.0);
    assert_relative_eq!(
        first.kpis.net_inflow_kwh,
        first.kpis.gross_generation_kwh - first.kpis.losses_kwh,
        max_relative = 1e-9
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_sweep_runs_concurrently_in_order() {
    let base = simulator(
        profiles(
            vec![0.0, 300.0, 300.0, 0.0, 0.0, 300.0, 0.0, 0.0],
            vec![0.0; 8],
            vec![100.0; 8],
        ),
        battery(100.0, 0.1, 0.1, 0.9, 100.0, 0.9025),
        greedy(),
    );
    let scenarios = battery_capacity_sweep(&base, &[50.0, 200.0, 800.0]).unwrap();
    let outcomes = run_scenarios(scenarios, &CancellationToken::new()).await;

    let names: Vec<_> = outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["battery_50kwh", "battery_200kwh", "battery_800kwh"]);

    let grid: Vec<f64> = outcomes
        .iter()
        .map(|o| o.result.as_ref().unwrap().kpis.grid_energy_kwh)
        .collect();
    assert!(grid.windows(2).all(|w| w[1] <= w[0] + 1e-6), "{grid:?}");
    assert!(grid[2] < grid[0]);
}

#[tokio::test]
async fn test_longer_feeders_lose_more_energy() {
    let base = simulator(
        profiles(vec![1500.0; 4], vec![0.0; 4], vec![1000.0; 4]),
        battery(500.0, 0.5, 0.1, 0.9, 250.0, 0.9025),
        greedy(),
    );
    let scenarios = transmission_distance_sweep(&base, &[10.0, 100.0, 1000.0], 34_500.0, 500.0).unwrap();
    let outcomes = run_scenarios(scenarios, &CancellationToken::new()).await;

    let losses: Vec<f64> = outcomes
        .iter()
        .map(|o| o.result.as_ref().unwrap().kpis.losses_kwh)
        .collect();
    assert!(losses[0] > 0.0);
    assert!(losses.windows(2).all(|w| w[1] > w[0]), "{losses:?}");
}

#[tokio::test]
async fn test_cancelled_sweep_returns_empty_runs() {
    let token = CancellationToken::new();
    token.cancel();
    let scenarios = battery_capacity_sweep(&default_simulator(), &[500.0, 1500.0]).unwrap();
    let outcomes = run_scenarios(scenarios, &token).await;

    assert_eq!(outcomes.len(), 2);
    for outcome in outcomes {
        let result = outcome.result.unwrap();
        assert_eq!(result.termination, Termination::Cancelled);
        assert!(result.records.is_empty());
    }
}
