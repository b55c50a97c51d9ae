//! Single-step reference scenarios and the solver fallback property.

use approx::assert_relative_eq;
use rstest::rstest;
use tokio_util::sync::CancellationToken;

use hybrid_dispatch::domain::BatteryMode;
use hybrid_dispatch::optimizer::DecisionSource;

use super::common::*;

#[tokio::test]
async fn test_wind_shortfall_with_empty_battery_draws_grid() {
    let sim = simulator(
        profiles(vec![50.0], vec![0.0], vec![100.0]),
        battery(100.0, 0.0, 0.0, 1.0, 50.0, 0.9025),
        greedy(),
    );
    let result = sim.run(&CancellationToken::new()).await.unwrap();

    let record = &result.records[0];
    assert_relative_eq!(record.decision.grid_draw_kw, 50.0, epsilon = 1e-9);
    assert_relative_eq!(record.decision.curtailed_kw, 0.0);
    assert_relative_eq!(record.decision.battery_discharge_kw, 0.0);
    assert_eq!(record.battery.mode, BatteryMode::Idle);
    assert_eq!(record.source, DecisionSource::Greedy);
}

#[tokio::test]
async fn test_full_battery_forces_curtailment() {
    let sim = simulator(
        profiles(vec![0.0], vec![80.0], vec![50.0]),
        battery(100.0, 1.0, 0.0, 1.0, 50.0, 0.9025),
        greedy(),
    );
    let result = sim.run(&CancellationToken::new()).await.unwrap();

    let record = &result.records[0];
    assert_relative_eq!(record.decision.curtailed_kw, 30.0, epsilon = 1e-9);
    assert_relative_eq!(record.decision.grid_draw_kw, 0.0);
    assert_relative_eq!(record.decision.battery_charge_kw, 0.0);
    assert_relative_eq!(record.battery.soc_kwh, 100.0);
    assert_relative_eq!(result.kpis.curtailed_energy_kwh, 30.0, epsilon = 1e-9);
}

#[tokio::test]
async fn test_battery_covers_demand_down_to_min_soc() {
    // 40 kW for one hour through a 0.9 discharge efficiency needs 40 / 0.9 kWh above the floor
    let initial = (10.0 + 40.0 / 0.9) / 100.0;
    let sim = simulator(
        profiles(vec![0.0], vec![0.0], vec![40.0]),
        battery(100.0, initial, 0.1, 0.9, 50.0, 0.81),
        greedy(),
    );
    let result = sim.run(&CancellationToken::new()).await.unwrap();

    let record = &result.records[0];
    assert_relative_eq!(record.decision.grid_draw_kw, 0.0, epsilon = 1e-6);
    assert_relative_eq!(record.decision.battery_discharge_kw, 40.0 / 0.9, epsilon = 1e-6);
    assert_relative_eq!(record.battery.soc_kwh, 10.0, epsilon = 1e-6);
    assert_eq!(record.battery.mode, BatteryMode::Discharging);
}

#[rstest]
#[case::surplus(120.0, 40.0)]
#[case::shortfall(20.0, 90.0)]
#[case::exact(60.0, 60.0)]
#[tokio::test]
async fn test_every_step_balances(#[case] wind_kw: f64, #[case] demand_kw: f64) {
    let sim = simulator(
        profiles(vec![wind_kw; 6], vec![0.0; 6], vec![demand_kw; 6]),
        battery(100.0, 0.5, 0.1, 0.9, 30.0, 0.9025),
        greedy(),
    );
    let result = sim.run(&CancellationToken::new()).await.unwrap();

    for r in &result.records {
        let residual = r.decision.balance_residual_kw(
            r.net_inflow_kw,
            r.demand_kw,
            r.battery.charge_efficiency,
            r.battery.discharge_efficiency,
        );
        assert!(residual.abs() < 1e-6, "step {} residual {residual}", r.step);
    }
}

#[cfg(feature = "optimization")]
mod horizon {
    use super::*;
    use hybrid_dispatch::error::InfeasibleDispatchError;
    use hybrid_dispatch::optimizer::{DispatchConfig, DispatchConstraints, DispatchOptimizer, StrategyKind};
    use hybrid_dispatch::simulation::TariffConfig;

    fn horizon(horizon_steps: usize, max_grid_import_kw: Option<f64>) -> DispatchOptimizer {
        DispatchOptimizer::from_config(&DispatchConfig {
            strategy: StrategyKind::Horizon,
            horizon_steps,
            solver_timeout_ms: 10_000,
            constraints: DispatchConstraints {
                max_grid_import_kw,
                ..Default::default()
            },
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_infeasible_horizon_matches_greedy_and_warns() {
        let plant = profiles(vec![0.0; 4], vec![0.0; 4], vec![100.0; 4]);
        let pack = battery(200.0, 0.5, 0.1, 0.9, 50.0, 0.81);

        // 10 kW of import plus 45 kW of delivered discharge can never meet 100 kW
        let constrained = simulator(plant.clone(), pack, horizon(4, Some(10.0)));
        let baseline = simulator(plant, pack, greedy());

        let fallback = constrained.run(&CancellationToken::new()).await.unwrap();
        let reference = baseline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(fallback.warnings.len(), 4);
        assert_eq!(fallback.kpis.optimizer_fallbacks, 4);
        for w in &fallback.warnings {
            assert_eq!(w.error, InfeasibleDispatchError::Infeasible);
        }
        for (f, g) in fallback.records.iter().zip(&reference.records) {
            assert_eq!(f.source, DecisionSource::GreedyFallback);
            assert_relative_eq!(f.decision.grid_draw_kw, g.decision.grid_draw_kw, epsilon = 1e-9);
            assert_relative_eq!(f.decision.battery_discharge_kw, g.decision.battery_discharge_kw, epsilon = 1e-9);
            assert_relative_eq!(f.battery.soc_kwh, g.battery.soc_kwh, epsilon = 1e-9);
        }
    }

    #[tokio::test]
    async fn test_horizon_buys_cheap_energy_for_the_evening_peak() {
        let mut prices = vec![0.08; 24];
        for hour in 0..6 {
            prices[hour] = 0.02;
        }
        for hour in 17..22 {
            prices[hour] = 0.30;
        }
        let tariff = TariffConfig {
            hourly_grid_price: Some(prices),
            ..Default::default()
        };

        let plant = profiles(vec![0.0; 24], vec![0.0; 24], vec![10.0; 24]);
        let pack = battery(100.0, 0.1, 0.1, 0.9, 20.0, 0.81);

        let lp = simulator(plant.clone(), pack, horizon(24, None))
            .with_tariff(tariff.clone())
            .unwrap();
        let heuristic = simulator(plant, pack, greedy()).with_tariff(tariff).unwrap();

        let planned = lp.run(&CancellationToken::new()).await.unwrap();
        let myopic = heuristic.run(&CancellationToken::new()).await.unwrap();

        assert!(planned.warnings.is_empty(), "{:?}", planned.warnings);
        assert!(planned.records.iter().all(|r| r.source == DecisionSource::Horizon));
        assert!(planned.kpis.grid_cost < myopic.kpis.grid_cost);
        assert_relative_eq!(myopic.kpis.grid_cost, myopic.kpis.grid_only_cost, epsilon = 1e-9);
    }
}
