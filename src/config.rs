use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{BatteryParams, TimeGrid};
use crate::error::ProfileError;
use crate::optimizer::DispatchConfig;
use crate::power_flow::LossConfig;
use crate::simulation::{EmissionFactors, GenerationConfig, LoadConfig, TariffConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub battery: BatteryParams,
    pub losses: LossesConfig,
    pub dispatch: DispatchConfig,
    pub generation: GenerationConfig,
    pub load: LoadConfig,
    pub tariff: TariffConfig,
    pub emissions: EmissionFactors,
}

/// Time range of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub start: DateTime<Utc>,
    pub step_minutes: u32,
    pub steps: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: Utc.with_ymd_and_hms(2025, 5, 21, 0, 0, 0).single().unwrap_or_default(),
            step_minutes: 60,
            steps: 24,
        }
    }
}

impl SimulationConfig {
    pub fn time_grid(&self) -> Result<TimeGrid, ProfileError> {
        TimeGrid::uniform(self.start, Duration::minutes(i64::from(self.step_minutes)), self.steps)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossesConfig {
    pub wind: LossConfig,
    pub solar: LossConfig,
}

impl Config {
    /// TOML file overlaid with `HPP__SECTION__KEY` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("HPP__").split("__"));
        figment
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .context("failed to parse configuration")
    }
}
