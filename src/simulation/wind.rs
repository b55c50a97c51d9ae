//! # Wind Farm Simulation
//!
//! Power-curve model of a utility wind farm: diurnal hub-height wind speed
//! with sinusoidal turbulence, a Betz-limited turbine curve, and a farm cap
//! at `capacity * capacity_factor`.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::ProfileError;

/// Hourly mean hub-height wind speed for a prairie site (m/s, hour 0 = midnight local)
pub const ALBERTA_HOURLY_WIND_SPEED: [f64; 24] = [
    6.5, 6.7, 6.8, 6.7, 6.5, 6.3, 6.0, 6.2, 6.8, 7.5, 8.0, 8.3, 8.5, 8.7, 8.8, 8.7, 8.4, 8.1,
    7.8, 7.4, 7.0, 6.7, 6.5, 6.4,
];

/// Power converter topology
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterType {
    /// Doubly-fed induction generator
    #[default]
    Dfig,
    /// Full-power converter
    FullPower,
}

impl ConverterType {
    pub fn efficiency(&self) -> f64 {
        match self {
            ConverterType::Dfig => 0.98,
            ConverterType::FullPower => 0.99,
        }
    }
}

/// Regional capacity factor presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindRegion {
    Alberta,
    Ontario,
    Quebec,
}

impl WindRegion {
    pub fn capacity_factor(&self) -> f64 {
        match self {
            WindRegion::Alberta => 0.345,
            WindRegion::Ontario => 0.26,
            WindRegion::Quebec => 0.32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindFarmConfig {
    /// Installed capacity in kW
    pub capacity_kw: f64,
    /// Explicit capacity factor; overrides `region` when set
    pub capacity_factor: Option<f64>,
    pub region: Option<WindRegion>,
    pub rotor_radius_m: f64,
    /// kg/m3
    pub air_density: f64,
    pub power_coefficient: f64,
    pub mechanical_efficiency: f64,
    pub converter: ConverterType,
    /// Wind speed at which one turbine reaches nameplate (m/s)
    pub rated_wind_speed: f64,
    pub turbulence_intensity: f64,
    /// 24 hourly mean wind speeds (m/s)
    pub hourly_wind_speed: Vec<f64>,
}

impl Default for WindFarmConfig {
    fn default() -> Self {
        Self {
            capacity_kw: 3500.0,
            capacity_factor: Some(0.38),
            region: None,
            rotor_radius_m: 75.0,
            air_density: 1.225,
            power_coefficient: 0.593, // Betz limit
            mechanical_efficiency: 0.95,
            converter: ConverterType::Dfig,
            rated_wind_speed: 11.5,
            turbulence_intensity: 0.1,
            hourly_wind_speed: ALBERTA_HOURLY_WIND_SPEED.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindFarmModel {
    config: WindFarmConfig,
    capacity_factor: f64,
    turbine_count: f64,
}

impl WindFarmModel {
    pub fn new(config: WindFarmConfig) -> Result<Self, ProfileError> {
        for (parameter, value) in [
            ("wind.capacity_kw", config.capacity_kw),
            ("wind.rotor_radius_m", config.rotor_radius_m),
            ("wind.air_density", config.air_density),
            ("wind.turbulence_intensity", config.turbulence_intensity),
        ] {
            non_negative(parameter, value)?;
        }
        for (parameter, value) in [
            ("wind.power_coefficient", config.power_coefficient),
            ("wind.mechanical_efficiency", config.mechanical_efficiency),
        ] {
            unit_interval(parameter, value)?;
        }
        if !(config.rated_wind_speed.is_finite() && config.rated_wind_speed > 0.0) {
            return Err(ProfileError::OutOfRange {
                parameter: "wind.rated_wind_speed",
                value: config.rated_wind_speed,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        if config.hourly_wind_speed.len() != 24 {
            return Err(ProfileError::LengthMismatch {
                profile: "wind.hourly_wind_speed".to_string(),
                expected: 24,
                actual: config.hourly_wind_speed.len(),
            });
        }
        for &speed in &config.hourly_wind_speed {
            non_negative("wind.hourly_wind_speed", speed)?;
        }

        let capacity_factor = config
            .capacity_factor
            .or_else(|| config.region.map(|r| r.capacity_factor()))
            .unwrap_or(1.0);
        unit_interval("wind.capacity_factor", capacity_factor)?;

        let mut model = Self {
            config,
            capacity_factor,
            turbine_count: 0.0,
        };
        let rated_turbine_kw = model.turbine_power_kw(model.config.rated_wind_speed);
        model.turbine_count = if rated_turbine_kw > 0.0 {
            model.config.capacity_kw / rated_turbine_kw
        } else {
            0.0
        };
        Ok(model)
    }

    pub fn capacity_kw(&self) -> f64 {
        self.config.capacity_kw
    }

    pub fn capacity_factor(&self) -> f64 {
        self.capacity_factor
    }

    /// Equivalent number of turbines needed to reach nameplate at rated wind speed.
    pub fn turbine_count(&self) -> f64 {
        self.turbine_count
    }

    /// Single-turbine output at `wind_speed` m/s (kW).
    pub fn turbine_power_kw(&self, wind_speed: f64) -> f64 {
        let c = &self.config;
        let swept_area = PI * c.rotor_radius_m * c.rotor_radius_m;
        let theoretical_w = 0.5 * c.air_density * swept_area * wind_speed.max(0.0).powi(3);
        theoretical_w * c.power_coefficient * c.mechanical_efficiency * c.converter.efficiency() / 1000.0
    }

    /// Mean hub-height wind speed at `hour` (local, fractional), interpolated between hourly points.
    pub fn base_wind_speed(&self, hour: f64) -> f64 {
        let speeds = &self.config.hourly_wind_speed;
        let h = hour.rem_euclid(24.0);
        let lower = (h.floor() as usize) % 24;
        let upper = (lower + 1) % 24;
        let frac = h - h.floor();
        speeds[lower] + (speeds[upper] - speeds[lower]) * frac
    }

    /// Effective wind speed including the 12 h turbulence cycle.
    ///
    /// `elapsed_hours` is time since the start of the run; `hour_of_day` is local time.
    pub fn effective_wind_speed(&self, hour_of_day: f64, elapsed_hours: f64) -> f64 {
        let base = self.base_wind_speed(hour_of_day);
        let variation = base * self.config.turbulence_intensity * (2.0 * PI * elapsed_hours / 12.0).sin();
        (base + variation).max(0.0)
    }

    /// Farm output at the turbine terminals (kW), before transmission losses.
    pub fn power_kw(&self, hour_of_day: f64, elapsed_hours: f64) -> f64 {
        let speed = self.effective_wind_speed(hour_of_day, elapsed_hours);
        let raw = self.turbine_power_kw(speed) * self.turbine_count;
        raw.min(self.config.capacity_kw * self.capacity_factor)
    }

    /// Expected annual production (kWh).
    pub fn annual_energy_kwh(&self) -> f64 {
        self.config.capacity_kw * self.capacity_factor * 8760.0
    }
}

pub(crate) fn non_negative(parameter: &'static str, value: f64) -> Result<(), ProfileError> {
    if !value.is_finite() {
        return Err(ProfileError::NonFinite { parameter, value });
    }
    if value < 0.0 {
        return Err(ProfileError::Negative { parameter, value });
    }
    Ok(())
}

/// Local time offsets stay within the range used by real time zones.
pub(crate) fn utc_offset(parameter: &'static str, value: f64) -> Result<(), ProfileError> {
    if !value.is_finite() || value.abs() > 14.0 {
        return Err(ProfileError::OutOfRange {
            parameter,
            value,
            min: -14.0,
            max: 14.0,
        });
    }
    Ok(())
}

pub(crate) fn unit_interval(parameter: &'static str, value: f64) -> Result<(), ProfileError> {
    non_negative(parameter, value)?;
    if value > 1.0 {
        return Err(ProfileError::OutOfRange {
            parameter,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_turbine_curve_follows_cube_law() {
        let farm = WindFarmModel::new(WindFarmConfig::default()).unwrap();
        let p4 = farm.turbine_power_kw(4.0);
        let p8 = farm.turbine_power_kw(8.0);
        assert_relative_eq!(p8 / p4, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_farm_reaches_nameplate_at_rated_speed() {
        let farm = WindFarmModel::new(WindFarmConfig::default()).unwrap();
        let at_rated = farm.turbine_power_kw(11.5) * farm.turbine_count();
        assert_relative_eq!(at_rated, 3500.0, epsilon = 1e-6);
    }

    #[test]
    fn test_output_capped_by_capacity_factor() {
        let farm = WindFarmModel::new(WindFarmConfig {
            capacity_factor: Some(0.2),
            hourly_wind_speed: vec![20.0; 24],
            ..WindFarmConfig::default()
        })
        .unwrap();
        assert_relative_eq!(farm.power_kw(12.0, 0.0), 700.0, epsilon = 1e-9);
    }

    #[test]
    fn test_diurnal_interpolation_wraps_midnight() {
        let farm = WindFarmModel::new(WindFarmConfig::default()).unwrap();
        assert_relative_eq!(farm.base_wind_speed(14.0), 8.8);
        assert_relative_eq!(farm.base_wind_speed(23.5), (6.4 + 6.5) / 2.0, epsilon = 1e-12);
        assert_relative_eq!(farm.base_wind_speed(-1.0), 6.4, epsilon = 1e-12);
    }

    #[test]
    fn test_turbulence_cycle() {
        let farm = WindFarmModel::new(WindFarmConfig::default()).unwrap();
        // sin(2*pi*3/12) = 1
        assert_relative_eq!(farm.effective_wind_speed(0.0, 3.0), 6.5 * 1.1, epsilon = 1e-12);
        assert_relative_eq!(farm.effective_wind_speed(0.0, 6.0), 6.5, epsilon = 1e-9);
    }

    #[test]
    fn test_region_capacity_factor() {
        let farm = WindFarmModel::new(WindFarmConfig {
            capacity_factor: None,
            region: Some(WindRegion::Ontario),
            ..WindFarmConfig::default()
        })
        .unwrap();
        assert_relative_eq!(farm.annual_energy_kwh(), 3500.0 * 0.26 * 8760.0);
    }

    #[test]
    fn test_negative_capacity_rejected() {
        let err = WindFarmModel::new(WindFarmConfig {
            capacity_kw: -1.0,
            ..WindFarmConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ProfileError::Negative { .. }));

        let err = WindFarmModel::new(WindFarmConfig {
            capacity_factor: Some(-0.1),
            ..WindFarmConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ProfileError::Negative { .. }));
    }
}
