//! # Generation Model
//!
//! Produces gross wind and solar output per timestep. Every variant is a pure
//! function of configuration and step index, so the sample sequence can be
//! restarted at any time and two runs see identical data.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::solar::{SolarConfig, SolarModel};
use super::wind::{non_negative, utc_offset, WindFarmConfig, WindFarmModel};
use crate::domain::{GenerationSample, InterpolationPolicy, TimeGrid, TimeSeries};
use crate::error::{DataGapError, ProfileError};

/// Multiplicative Gaussian noise on synthetic output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Variability {
    pub seed: u64,
    /// Standard deviation of the wind multiplier
    #[serde(default)]
    pub wind_sigma: f64,
    /// Standard deviation of the solar multiplier
    #[serde(default)]
    pub solar_sigma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationConfig {
    /// Explicit per-step series aligned with the simulation grid
    Profile { wind_kw: Vec<f64>, solar_kw: Vec<f64> },
    Synthetic {
        #[serde(default)]
        wind: Option<WindFarmConfig>,
        #[serde(default)]
        solar: Option<SolarConfig>,
        #[serde(default)]
        variability: Option<Variability>,
        /// Local time offset used for time-of-day lookups
        #[serde(default)]
        utc_offset_hours: f64,
    },
    /// Externally measured data
    Measured {
        wind: TimeSeries,
        solar: TimeSeries,
        #[serde(default)]
        interpolation: InterpolationPolicy,
    },
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig::Synthetic {
            wind: Some(WindFarmConfig::default()),
            solar: Some(SolarConfig::default()),
            variability: None,
            utc_offset_hours: -7.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticGeneration {
    wind: Option<WindFarmModel>,
    solar: Option<SolarModel>,
    wind_noise: Option<Normal<f64>>,
    solar_noise: Option<Normal<f64>>,
    seed: u64,
    utc_offset: Duration,
}

impl SyntheticGeneration {
    /// Noise multiplier for `index`, seeded from `(seed, index, stream)` only.
    fn noise(&self, noise: Option<&Normal<f64>>, index: usize, stream: u64) -> f64 {
        match noise {
            Some(dist) => {
                let key = self
                    .seed
                    .wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
                    .wrapping_add(stream.wrapping_mul(0xD1B5_4A32_D192_ED03));
                let mut rng = StdRng::seed_from_u64(key);
                dist.sample(&mut rng).max(0.0)
            }
            None => 1.0,
        }
    }

    fn sample(&self, grid: &TimeGrid, index: usize, timestamp: DateTime<Utc>) -> GenerationSample {
        let local = (timestamp + self.utc_offset).naive_utc();
        let hour_of_day = local.hour() as f64 + local.minute() as f64 / 60.0 + local.second() as f64 / 3600.0;
        let elapsed_hours = grid
            .timestamp(0)
            .map(|start| (timestamp - start).num_milliseconds() as f64 / 3_600_000.0)
            .unwrap_or(0.0);

        let wind_kw = self
            .wind
            .as_ref()
            .map(|w| w.power_kw(hour_of_day, elapsed_hours) * self.noise(self.wind_noise.as_ref(), index, 1))
            .unwrap_or(0.0);
        let solar_kw = self
            .solar
            .as_ref()
            .map(|s| s.power_kw(local) * self.noise(self.solar_noise.as_ref(), index, 2))
            .unwrap_or(0.0);

        GenerationSample {
            timestamp,
            wind_kw,
            solar_kw,
        }
    }
}

#[derive(Debug, Clone)]
pub enum GenerationModel {
    Profile { wind_kw: Vec<f64>, solar_kw: Vec<f64> },
    Synthetic(Box<SyntheticGeneration>),
    Measured {
        wind: TimeSeries,
        solar: TimeSeries,
        interpolation: InterpolationPolicy,
    },
}

impl GenerationModel {
    /// Build and validate against the run's time grid.
    pub fn from_config(config: &GenerationConfig, grid: &TimeGrid) -> Result<Self, ProfileError> {
        let model = match config {
            GenerationConfig::Profile { wind_kw, solar_kw } => GenerationModel::Profile {
                wind_kw: wind_kw.clone(),
                solar_kw: solar_kw.clone(),
            },
            GenerationConfig::Synthetic {
                wind,
                solar,
                variability,
                utc_offset_hours,
            } => {
                let wind = wind.clone().map(WindFarmModel::new).transpose()?;
                let solar = solar
                    .as_ref()
                    .map(|s| SolarModel::new(s, *utc_offset_hours))
                    .transpose()?;
                let (wind_noise, solar_noise, seed) = match variability {
                    Some(v) => (noise("wind_sigma", v.wind_sigma)?, noise("solar_sigma", v.solar_sigma)?, v.seed),
                    None => (None, None, 0),
                };
                utc_offset("utc_offset_hours", *utc_offset_hours)?;
                GenerationModel::Synthetic(Box::new(SyntheticGeneration {
                    wind,
                    solar,
                    wind_noise,
                    solar_noise,
                    seed,
                    utc_offset: Duration::milliseconds((utc_offset_hours * 3_600_000.0).round() as i64),
                }))
            }
            GenerationConfig::Measured {
                wind,
                solar,
                interpolation,
            } => GenerationModel::Measured {
                wind: wind.clone(),
                solar: solar.clone(),
                interpolation: *interpolation,
            },
        };
        model.validate_for(grid)?;
        Ok(model)
    }

    /// Check that this model can serve every step of `grid`.
    ///
    /// Measured data is only checked for sign here; gaps surface per step as `DataGapError`.
    pub fn validate_for(&self, grid: &TimeGrid) -> Result<(), ProfileError> {
        if grid.is_empty() {
            return Err(ProfileError::EmptyRange);
        }
        match self {
            GenerationModel::Profile { wind_kw, solar_kw } => {
                for (name, values) in [("wind", wind_kw), ("solar", solar_kw)] {
                    if values.len() != grid.len() {
                        return Err(ProfileError::LengthMismatch {
                            profile: name.to_string(),
                            expected: grid.len(),
                            actual: values.len(),
                        });
                    }
                    for &v in values.iter() {
                        non_negative("generation profile value", v)?;
                    }
                }
            }
            GenerationModel::Synthetic(_) => {}
            GenerationModel::Measured { wind, solar, .. } => {
                for series in [wind, solar] {
                    if let Some(min) = series.min_value() {
                        non_negative("measured generation value", min)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Gross generation at step `index` of `grid`.
    pub fn sample_at(&self, grid: &TimeGrid, index: usize) -> Result<GenerationSample, DataGapError> {
        let timestamp = grid.timestamp(index).ok_or_else(|| DataGapError {
            series: "generation".to_string(),
            timestamp: grid
                .timestamps()
                .last()
                .map(|last| *last + grid.nominal_step() * (index + 1 - grid.len()) as i32)
                .unwrap_or_default(),
        })?;

        match self {
            GenerationModel::Profile { wind_kw, solar_kw } => {
                let gap = |series: &str| DataGapError {
                    series: series.to_string(),
                    timestamp,
                };
                Ok(GenerationSample {
                    timestamp,
                    wind_kw: *wind_kw.get(index).ok_or_else(|| gap("wind"))?,
                    solar_kw: *solar_kw.get(index).ok_or_else(|| gap("solar"))?,
                })
            }
            GenerationModel::Synthetic(synthetic) => Ok(synthetic.sample(grid, index, timestamp)),
            GenerationModel::Measured {
                wind,
                solar,
                interpolation,
            } => Ok(GenerationSample {
                timestamp,
                wind_kw: wind.value_at("wind", timestamp, *interpolation)?.max(0.0),
                solar_kw: solar.value_at("solar", timestamp, *interpolation)?.max(0.0),
            }),
        }
    }

    /// Lazy, finite sample sequence over `grid`. Call again to restart.
    pub fn samples<'a>(
        &'a self,
        grid: &'a TimeGrid,
    ) -> impl Iterator<Item = Result<GenerationSample, DataGapError>> + 'a {
        (0..grid.len()).map(move |i| self.sample_at(grid, i))
    }
}

fn noise(parameter: &'static str, sigma: f64) -> Result<Option<Normal<f64>>, ProfileError> {
    non_negative(parameter, sigma)?;
    if sigma == 0.0 {
        return Ok(None);
    }
    Normal::new(1.0, sigma)
        .map(Some)
        .map_err(|_| ProfileError::NonFinite { parameter, value: sigma })
}
