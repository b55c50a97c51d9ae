//! # HPC Load Model
//!
//! Demand of the computing facility. The baseline is a constant full-utilization
//! draw; diurnal utilization, explicit profiles and a bottom-up facility
//! composition are available for sensitivity runs.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::wind::{non_negative, unit_interval, utc_offset};
use crate::domain::{InterpolationPolicy, LoadSample, TimeGrid, TimeSeries};
use crate::error::{DataGapError, ProfileError};

/// Bottom-up composition of an HPC facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HpcFacilityConfig {
    pub total_nodes: u32,
    pub gpu_node_ratio: f64,
    pub gpu_node_power_w: f64,
    pub gpu_idle_factor: f64,
    pub cpu_node_ratio: f64,
    pub cpu_node_power_w: f64,
    pub cpu_idle_factor: f64,
    pub asic_units: u32,
    pub asic_unit_power_w: f64,
    pub storage_node_ratio: f64,
    pub storage_node_power_w: f64,
    pub network_node_ratio: f64,
    pub network_node_power_w: f64,
    /// Power usage effectiveness (facility / IT)
    pub pue: f64,
    /// Lighting, offices and other facility overhead as a fraction of the total
    pub overhead_fraction: f64,
    pub utilization: f64,
}

impl Default for HpcFacilityConfig {
    fn default() -> Self {
        Self {
            total_nodes: 2000,
            gpu_node_ratio: 0.75,
            gpu_node_power_w: 2000.0,
            gpu_idle_factor: 0.25,
            cpu_node_ratio: 0.20,
            cpu_node_power_w: 600.0,
            cpu_idle_factor: 0.15,
            asic_units: 100,
            asic_unit_power_w: 3200.0,
            storage_node_ratio: 0.08,
            storage_node_power_w: 150.0,
            network_node_ratio: 0.06,
            network_node_power_w: 100.0,
            pue: 1.22,
            overhead_fraction: 0.02,
            utilization: 1.0,
        }
    }
}

impl HpcFacilityConfig {
    fn validate(&self) -> Result<(), ProfileError> {
        for (parameter, value) in [
            ("facility.gpu_node_power_w", self.gpu_node_power_w),
            ("facility.cpu_node_power_w", self.cpu_node_power_w),
            ("facility.asic_unit_power_w", self.asic_unit_power_w),
            ("facility.storage_node_power_w", self.storage_node_power_w),
            ("facility.network_node_power_w", self.network_node_power_w),
        ] {
            non_negative(parameter, value)?;
        }
        for (parameter, value) in [
            ("facility.gpu_node_ratio", self.gpu_node_ratio),
            ("facility.cpu_node_ratio", self.cpu_node_ratio),
            ("facility.storage_node_ratio", self.storage_node_ratio),
            ("facility.network_node_ratio", self.network_node_ratio),
            ("facility.gpu_idle_factor", self.gpu_idle_factor),
            ("facility.cpu_idle_factor", self.cpu_idle_factor),
            ("facility.overhead_fraction", self.overhead_fraction),
            ("facility.utilization", self.utilization),
        ] {
            unit_interval(parameter, value)?;
        }
        if !self.pue.is_finite() || self.pue < 1.0 {
            return Err(ProfileError::OutOfRange {
                parameter: "facility.pue",
                value: self.pue,
                min: 1.0,
                max: f64::MAX,
            });
        }
        Ok(())
    }

    /// IT equipment draw at `utilization` (kW).
    pub fn it_power_kw(&self, utilization: f64) -> f64 {
        let nodes = f64::from(self.total_nodes);
        let scaled = |power_w: f64, idle: f64| power_w * (idle + (1.0 - idle) * utilization);

        let gpu = nodes * self.gpu_node_ratio * scaled(self.gpu_node_power_w, self.gpu_idle_factor);
        let cpu = nodes * self.cpu_node_ratio * scaled(self.cpu_node_power_w, self.cpu_idle_factor);
        let asic = f64::from(self.asic_units) * self.asic_unit_power_w;
        let storage = nodes * self.storage_node_ratio * self.storage_node_power_w * (0.8 + 0.2 * utilization);
        let network = nodes * self.network_node_ratio * self.network_node_power_w * (0.7 + 0.3 * utilization);

        (gpu + cpu + asic + storage + network) / 1000.0
    }

    /// Total facility draw including cooling (PUE) and overhead (kW).
    pub fn facility_power_kw(&self) -> f64 {
        self.it_power_kw(self.utilization) * self.pue * (1.0 + self.overhead_fraction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadConfig {
    Constant {
        demand_kw: f64,
    },
    /// Utilization swinging between `min_utilization` and `max_utilization`, peaking at `peak_hour` local time
    Diurnal {
        rated_kw: f64,
        min_utilization: f64,
        max_utilization: f64,
        #[serde(default = "default_peak_hour")]
        peak_hour: f64,
        #[serde(default)]
        utc_offset_hours: f64,
    },
    /// Explicit per-step demand aligned with the simulation grid
    Profile {
        demand_kw: Vec<f64>,
    },
    Facility(HpcFacilityConfig),
}

fn default_peak_hour() -> f64 {
    15.0
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig::Constant { demand_kw: 2000.0 }
    }
}

#[derive(Debug, Clone)]
pub enum LoadModel {
    Constant(f64),
    Diurnal {
        rated_kw: f64,
        min_utilization: f64,
        max_utilization: f64,
        peak_hour: f64,
        utc_offset: Duration,
    },
    Profile(TimeSeries),
}

impl LoadModel {
    pub fn from_config(config: &LoadConfig, grid: &TimeGrid) -> Result<Self, ProfileError> {
        match config {
            LoadConfig::Constant { demand_kw } => Self::constant(*demand_kw),
            LoadConfig::Diurnal {
                rated_kw,
                min_utilization,
                max_utilization,
                peak_hour,
                utc_offset_hours,
            } => {
                non_negative("load.rated_kw", *rated_kw)?;
                unit_interval("load.min_utilization", *min_utilization)?;
                unit_interval("load.max_utilization", *max_utilization)?;
                utc_offset("load.utc_offset_hours", *utc_offset_hours)?;
                if !peak_hour.is_finite() || !(0.0..24.0).contains(peak_hour) {
                    return Err(ProfileError::OutOfRange {
                        parameter: "load.peak_hour",
                        value: *peak_hour,
                        min: 0.0,
                        max: 24.0,
                    });
                }
                if min_utilization > max_utilization {
                    return Err(ProfileError::OutOfRange {
                        parameter: "load.min_utilization",
                        value: *min_utilization,
                        min: 0.0,
                        max: *max_utilization,
                    });
                }
                Ok(LoadModel::Diurnal {
                    rated_kw: *rated_kw,
                    min_utilization: *min_utilization,
                    max_utilization: *max_utilization,
                    peak_hour: *peak_hour,
                    utc_offset: Duration::milliseconds((utc_offset_hours * 3_600_000.0).round() as i64),
                })
            }
            LoadConfig::Profile { demand_kw } => {
                if demand_kw.len() != grid.len() {
                    return Err(ProfileError::LengthMismatch {
                        profile: "load".to_string(),
                        expected: grid.len(),
                        actual: demand_kw.len(),
                    });
                }
                for &v in demand_kw {
                    non_negative("load.demand_kw", v)?;
                }
                let series = TimeSeries::from_pairs(grid.timestamps().iter().copied().zip(demand_kw.iter().copied()))?;
                Ok(LoadModel::Profile(series))
            }
            LoadConfig::Facility(facility) => {
                facility.validate()?;
                Self::constant(facility.facility_power_kw())
            }
        }
    }

    pub fn constant(demand_kw: f64) -> Result<Self, ProfileError> {
        non_negative("load.demand_kw", demand_kw)?;
        Ok(LoadModel::Constant(demand_kw))
    }

    /// Demand at `timestamp` (kW, never negative).
    pub fn demand(&self, timestamp: DateTime<Utc>) -> Result<f64, DataGapError> {
        match self {
            LoadModel::Constant(kw) => Ok(*kw),
            LoadModel::Diurnal {
                rated_kw,
                min_utilization,
                max_utilization,
                peak_hour,
                utc_offset,
            } => {
                let local = (timestamp + *utc_offset).naive_utc();
                let hour = local.hour() as f64 + local.minute() as f64 / 60.0;
                let mean = (max_utilization + min_utilization) / 2.0;
                let amplitude = (max_utilization - min_utilization) / 2.0;
                let utilization = mean + amplitude * (2.0 * PI * (hour - peak_hour) / 24.0).cos();
                Ok(rated_kw * utilization)
            }
            LoadModel::Profile(series) => series.value_at("load", timestamp, InterpolationPolicy::None),
        }
    }

    pub fn sample(&self, timestamp: DateTime<Utc>) -> Result<LoadSample, DataGapError> {
        Ok(LoadSample {
            timestamp,
            demand_kw: self.demand(timestamp)?,
        })
    }
}
