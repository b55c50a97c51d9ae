//! Randomised invariants over greedy and horizon runs.

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use hybrid_dispatch::domain::BatteryParams;
use hybrid_dispatch::optimizer::DispatchOptimizer;
use hybrid_dispatch::simulation::SimulationResult;

use super::common::*;

fn run_with(
    optimizer: DispatchOptimizer,
    wind: &[f64],
    solar: &[f64],
    demand: &[f64],
    pack: BatteryParams,
) -> SimulationResult {
    let sim = simulator(profiles(wind.to_vec(), solar.to_vec(), demand.to_vec()), pack, optimizer);
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(sim.run(&CancellationToken::new()))
        .unwrap()
}

fn run_blocking(wind: &[f64], solar: &[f64], demand: &[f64], pack: BatteryParams) -> SimulationResult {
    run_with(greedy(), wind, solar, demand, pack)
}

/// Balance, SoC bounds and charge/discharge exclusion on every recorded step.
fn check_step_invariants(result: &SimulationResult, pack: &BatteryParams) -> Result<(), TestCaseError> {
    let slack = 1e-9 * pack.capacity_kwh.max(1.0);
    for r in &result.records {
        let d = &r.decision;
        prop_assert!(d.is_finite_non_negative());
        prop_assert!(!(d.is_charging() && d.is_discharging()));

        let scale = r.net_inflow_kw.max(r.demand_kw).max(d.grid_draw_kw).max(1.0);
        let residual = d.balance_residual_kw(
            r.net_inflow_kw,
            r.demand_kw,
            r.battery.charge_efficiency,
            r.battery.discharge_efficiency,
        );
        prop_assert!(residual.abs() <= 1e-6 * scale, "step {} residual {}", r.step, residual);

        prop_assert!(r.battery.soc_kwh >= r.battery.min_soc_kwh - slack);
        prop_assert!(r.battery.soc_kwh <= r.battery.max_soc_kwh + slack);
        prop_assert!(d.curtailed_kw <= r.net_inflow_kw + 1e-6 * scale);
    }
    Ok(())
}

fn plant() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<f64>)> {
    (1usize..36).prop_flat_map(|n| {
        (
            prop::collection::vec(0.0f64..500.0, n),
            prop::collection::vec(0.0f64..300.0, n),
            prop::collection::vec(0.0f64..600.0, n),
        )
    })
}

fn pack() -> impl Strategy<Value = BatteryParams> {
    (1.0f64..1000.0, 0.0f64..0.3, 0.7f64..1.0, 0.0f64..1.0, 1.0f64..400.0, 0.6f64..1.0).prop_map(
        |(capacity, min, max, position, rate, rte)| battery(capacity, min + (max - min) * position, min, max, rate, rte),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_energy_balance_and_battery_limits_hold((wind, solar, demand) in plant(), pack in pack()) {
        let result = run_blocking(&wind, &solar, &demand, pack);
        prop_assert_eq!(result.records.len(), demand.len());

        check_step_invariants(&result, &pack)?;
    }

    #[test]
    fn prop_more_capacity_never_increases_grid_energy(
        (wind, solar, demand) in plant(),
        pack in pack(),
        factor in 1.0f64..4.0,
    ) {
        let larger = BatteryParams { capacity_kwh: pack.capacity_kwh * factor, ..pack };
        let small = run_blocking(&wind, &solar, &demand, pack);
        let big = run_blocking(&wind, &solar, &demand, larger);

        let tolerance = 1e-6 * small.kpis.total_demand_kwh.max(1.0);
        prop_assert!(big.kpis.grid_energy_kwh <= small.kpis.grid_energy_kwh + tolerance);
    }

    #[test]
    fn prop_faster_charging_never_increases_grid_energy(
        (wind, solar, demand) in plant(),
        pack in pack(),
        extra_kw in 0.0f64..400.0,
    ) {
        let faster = BatteryParams { max_charge_kw: pack.max_charge_kw + extra_kw, ..pack };
        let slow = run_blocking(&wind, &solar, &demand, pack);
        let fast = run_blocking(&wind, &solar, &demand, faster);

        let tolerance = 1e-6 * slow.kpis.total_demand_kwh.max(1.0);
        prop_assert!(fast.kpis.grid_energy_kwh <= slow.kpis.grid_energy_kwh + tolerance);
    }

    #[test]
    fn prop_faster_discharging_never_increases_grid_energy(
        (wind, solar, demand) in plant(),
        pack in pack(),
        extra_kw in 0.0f64..400.0,
    ) {
        let faster = BatteryParams { max_discharge_kw: pack.max_discharge_kw + extra_kw, ..pack };
        let slow = run_blocking(&wind, &solar, &demand, pack);
        let fast = run_blocking(&wind, &solar, &demand, faster);

        let tolerance = 1e-6 * slow.kpis.total_demand_kwh.max(1.0);
        prop_assert!(fast.kpis.grid_energy_kwh <= slow.kpis.grid_energy_kwh + tolerance);
    }

    #[test]
    fn prop_identical_inputs_give_identical_results((wind, solar, demand) in plant(), pack in pack()) {
        let first = run_blocking(&wind, &solar, &demand, pack);
        let second = run_blocking(&wind, &solar, &demand, pack);
        prop_assert_eq!(first, second);
    }
}

#[cfg(feature = "optimization")]
mod horizon {
    use super::*;
    use hybrid_dispatch::optimizer::{DecisionSource, DispatchConfig, StrategyKind};

    fn horizon() -> DispatchOptimizer {
        DispatchOptimizer::from_config(&DispatchConfig {
            strategy: StrategyKind::Horizon,
            horizon_steps: 6,
            solver_timeout_ms: 10_000,
            ..Default::default()
        })
        .unwrap()
    }

    fn short_plant() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<f64>)> {
        (1usize..12).prop_flat_map(|n| {
            (
                prop::collection::vec(0.0f64..500.0, n),
                prop::collection::vec(0.0f64..300.0, n),
                prop::collection::vec(0.0f64..600.0, n),
            )
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_horizon_runs_keep_step_invariants((wind, solar, demand) in short_plant(), pack in pack()) {
            let result = run_with(horizon(), &wind, &solar, &demand, pack);
            prop_assert_eq!(result.records.len(), demand.len());
            // Unlimited grid import keeps every window feasible
            prop_assert!(result.warnings.is_empty(), "{:?}", result.warnings);
            prop_assert!(result.records.iter().all(|r| r.source == DecisionSource::Horizon));
            check_step_invariants(&result, &pack)?;

            let again = run_with(horizon(), &wind, &solar, &demand, pack);
            prop_assert_eq!(result, again);
        }
    }
}
