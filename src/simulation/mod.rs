//! # Plant Simulation
//!
//! Drives the hybrid plant over a time grid.
//!
//! ## Components
//!
//! - **Wind**: Turbine power curve over an hourly wind-speed profile with seeded turbulence
//! - **Solar**: Hourly capacity-factor curve or clear-sky irradiance model
//! - **Generation / Load**: Profile, synthetic and measured inputs resolved per timestep
//! - **Runner**: The time loop that applies dispatch decisions to the battery
//! - **Sweep**: Concurrent scenario runs over battery sizes or feeder lengths
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hybrid_dispatch::config::Config;
//! use hybrid_dispatch::simulation::Simulator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load("config/default.toml")?;
//! let simulator = Simulator::from_config(&config)?;
//! let result = simulator.run(&CancellationToken::new()).await?;
//! println!("grid energy: {:.1} kWh", result.kpis.grid_energy_kwh);
//! # Ok(())
//! # }
//! ```

pub mod generation;
pub mod load;
pub mod result;
pub mod runner;
pub mod solar;
pub mod sweep;
pub mod wind;

pub use generation::{GenerationConfig, GenerationModel, SyntheticGeneration, Variability};
pub use load::{HpcFacilityConfig, LoadConfig, LoadModel};
pub use result::{
    DispatchWarning, EmissionFactors, KpiSummary, SimulationResult, StepRecord, TariffConfig, Termination,
};
pub use runner::{PlantProfiles, Simulator};
pub use solar::{ClearSkyModel, SolarConfig, SolarModel};
pub use sweep::{
    battery_capacity_sweep, run_scenarios, transmission_distance_sweep, Scenario, ScenarioError, ScenarioOutcome,
};
pub use wind::{ConverterType, WindFarmConfig, WindFarmModel, WindRegion};
