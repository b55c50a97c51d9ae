//! # Solar Production Simulation
//!
//! Two ways of turning a local time into PV output:
//! - an hourly daily curve scaled by a monthly seasonal factor
//! - a clear-sky radiation model from solar position and air mass

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::wind::{non_negative, unit_interval};
use crate::error::ProfileError;

/// Normalized daily output of a 38.9 MW prairie solar farm (fraction of AC capacity)
pub const PRAIRIE_HOURLY_PROFILE: [f64; 24] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    9.5 / 38.9, 18.0 / 38.9, 25.5 / 38.9, 32.0 / 38.9, 36.0 / 38.9,
    38.5 / 38.9, 38.0 / 38.9, 36.0 / 38.9, 32.0 / 38.9, 25.5 / 38.9, 18.0 / 38.9, 9.5 / 38.9,
    0.0, 0.0, 0.0, 0.0, 0.0,
];

/// Monthly multiplier on the daily curve, January first
pub const PRAIRIE_SEASONAL_FACTORS: [f64; 12] = [
    0.28, 0.51, 0.99, 1.35, 1.70, 1.74, 1.78, 1.50, 1.01, 0.59, 0.30, 0.21,
];

/// Clear-sky solar radiation model
///
/// Simplified model based on:
/// - Solar position calculation (elevation and azimuth)
/// - Atmospheric attenuation through air mass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearSkyModel {
    latitude_deg: f64,
    longitude_deg: f64,
    utc_offset_hours: f64,
}

impl ClearSkyModel {
    pub fn new(latitude_deg: f64, longitude_deg: f64, utc_offset_hours: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            utc_offset_hours,
        }
    }

    /// Calculate solar position for a local time
    ///
    /// Returns: (elevation_deg, azimuth_deg)
    /// Elevation: angle above horizon (0 = horizon, 90 = directly overhead)
    /// Azimuth: angle from north (0 = north, 90 = east, 180 = south, 270 = west)
    pub fn solar_position(&self, local: NaiveDateTime) -> (f64, f64) {
        let day_of_year = local.ordinal() as f64;
        let hour = local.hour() as f64 + local.minute() as f64 / 60.0;

        // Solar declination, -23.45 (winter solstice) to +23.45 (summer solstice)
        let declination_rad = (23.45 * (360.0 / 365.0 * (day_of_year + 284.0)).to_radians().sin()).to_radians();
        let latitude_rad = self.latitude_deg.to_radians();

        // Hour angle from solar noon
        let solar_time = hour + self.longitude_deg / 15.0 - self.utc_offset_hours;
        let hour_angle_deg = 15.0 * (solar_time - 12.0);
        let hour_angle_rad = hour_angle_deg.to_radians();

        let elevation_sin = latitude_rad.sin() * declination_rad.sin()
            + latitude_rad.cos() * declination_rad.cos() * hour_angle_rad.cos();
        let elevation_rad = elevation_sin.clamp(-1.0, 1.0).asin();

        let azimuth_cos = (declination_rad.sin() - latitude_rad.sin() * elevation_rad.sin())
            / (latitude_rad.cos() * elevation_rad.cos());
        let mut azimuth_deg = azimuth_cos.clamp(-1.0, 1.0).acos().to_degrees();

        // Afternoon sun is in the western sky
        if hour_angle_deg > 0.0 {
            azimuth_deg = 360.0 - azimuth_deg;
        }

        (elevation_rad.to_degrees(), azimuth_deg)
    }

    /// Clear-sky global irradiance on a horizontal surface (W/m2)
    pub fn clear_sky_irradiance(&self, local: NaiveDateTime) -> f64 {
        let (elevation_deg, _) = self.solar_position(local);
        if elevation_deg <= 0.0 {
            return 0.0;
        }

        let elevation_rad = elevation_deg.to_radians();
        let solar_constant = 1367.0;

        // AM = 1/sin(elevation); linear approximation near the horizon avoids the singularity
        let air_mass = if elevation_deg > 5.0 {
            1.0 / elevation_rad.sin()
        } else {
            12.0 - elevation_deg / 5.0
        };

        let transmittance = 0.7_f64.powf(air_mass.powf(0.678));
        solar_constant * transmittance * elevation_rad.sin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SolarConfig {
    HourlyCurve {
        /// AC capacity in kW
        capacity_kw: f64,
        #[serde(default = "default_hourly_profile")]
        hourly_profile: Vec<f64>,
        #[serde(default = "default_seasonal_factors")]
        seasonal_factors: Vec<f64>,
        /// Rescale the daily curve so its mean equals this capacity factor
        #[serde(default)]
        capacity_factor: Option<f64>,
    },
    ClearSky {
        capacity_kw: f64,
        #[serde(default = "default_system_efficiency")]
        system_efficiency: f64,
        latitude_deg: f64,
        longitude_deg: f64,
    },
}

fn default_hourly_profile() -> Vec<f64> {
    PRAIRIE_HOURLY_PROFILE.to_vec()
}

fn default_seasonal_factors() -> Vec<f64> {
    PRAIRIE_SEASONAL_FACTORS.to_vec()
}

fn default_system_efficiency() -> f64 {
    0.85
}

impl Default for SolarConfig {
    fn default() -> Self {
        SolarConfig::HourlyCurve {
            capacity_kw: 1000.0,
            hourly_profile: default_hourly_profile(),
            seasonal_factors: default_seasonal_factors(),
            capacity_factor: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SolarModel {
    HourlyCurve {
        capacity_kw: f64,
        hourly_profile: Vec<f64>,
        seasonal_factors: Vec<f64>,
        scale: f64,
    },
    ClearSky {
        capacity_kw: f64,
        system_efficiency: f64,
        sky: ClearSkyModel,
    },
}

impl SolarModel {
    pub fn new(config: &SolarConfig, utc_offset_hours: f64) -> Result<Self, ProfileError> {
        match config {
            SolarConfig::HourlyCurve {
                capacity_kw,
                hourly_profile,
                seasonal_factors,
                capacity_factor,
            } => {
                non_negative("solar.capacity_kw", *capacity_kw)?;
                check_length("solar.hourly_profile", hourly_profile, 24)?;
                check_length("solar.seasonal_factors", seasonal_factors, 12)?;
                for &v in hourly_profile {
                    non_negative("solar.hourly_profile", v)?;
                }
                for &v in seasonal_factors {
                    non_negative("solar.seasonal_factors", v)?;
                }

                let scale = match capacity_factor {
                    Some(cf) => {
                        unit_interval("solar.capacity_factor", *cf)?;
                        let mean = hourly_profile.iter().sum::<f64>() / 24.0;
                        if mean > 0.0 {
                            cf / mean
                        } else {
                            0.0
                        }
                    }
                    None => 1.0,
                };

                Ok(SolarModel::HourlyCurve {
                    capacity_kw: *capacity_kw,
                    hourly_profile: hourly_profile.clone(),
                    seasonal_factors: seasonal_factors.clone(),
                    scale,
                })
            }
            SolarConfig::ClearSky {
                capacity_kw,
                system_efficiency,
                latitude_deg,
                longitude_deg,
            } => {
                non_negative("solar.capacity_kw", *capacity_kw)?;
                unit_interval("solar.system_efficiency", *system_efficiency)?;
                if !(-90.0..=90.0).contains(latitude_deg) {
                    return Err(ProfileError::OutOfRange {
                        parameter: "solar.latitude_deg",
                        value: *latitude_deg,
                        min: -90.0,
                        max: 90.0,
                    });
                }
                Ok(SolarModel::ClearSky {
                    capacity_kw: *capacity_kw,
                    system_efficiency: *system_efficiency,
                    sky: ClearSkyModel::new(*latitude_deg, *longitude_deg, utc_offset_hours),
                })
            }
        }
    }

    pub fn capacity_kw(&self) -> f64 {
        match self {
            SolarModel::HourlyCurve { capacity_kw, .. } | SolarModel::ClearSky { capacity_kw, .. } => {
                *capacity_kw
            }
        }
    }

    /// AC output at a local time (kW), clipped at capacity.
    pub fn power_kw(&self, local: NaiveDateTime) -> f64 {
        let power = match self {
            SolarModel::HourlyCurve {
                capacity_kw,
                hourly_profile,
                seasonal_factors,
                scale,
            } => {
                let hour = local.hour() as f64 + local.minute() as f64 / 60.0;
                let lower = local.hour() as usize % 24;
                let upper = (lower + 1) % 24;
                let frac = hour - hour.floor();
                let shape = hourly_profile[lower] + (hourly_profile[upper] - hourly_profile[lower]) * frac;
                let season = seasonal_factors[local.month0() as usize];
                capacity_kw * shape * season * scale
            }
            SolarModel::ClearSky {
                capacity_kw,
                system_efficiency,
                sky,
            } => sky.clear_sky_irradiance(local) / 1000.0 * capacity_kw * system_efficiency,
        };
        power.clamp(0.0, self.capacity_kw())
    }
}

fn check_length(profile: &str, values: &[f64], expected: usize) -> Result<(), ProfileError> {
    if values.len() != expected {
        return Err(ProfileError::LengthMismatch {
            profile: profile.to_string(),
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}
