//! # Loss Model
//!
//! Converts gross generation at the plant terminals into net power delivered
//! to the HPC bus. Two policies:
//! - successive fractional derating, `net = gross * prod(1 - loss_i)`
//! - resistive `I^2 R` loss, either from a lumped resistance or from a
//!   conductor (resistivity, length, cross-section)
//!
//! The policy is fixed by configuration; callers only ever see `apply`.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::LossParameterError;

/// Copper resistivity at 20 C (ohm m)
pub const COPPER_RESISTIVITY_OHM_M: f64 = 1.68e-8;

/// Per-step operating conditions a loss policy may use.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossConditions {
    /// Measured line current. When absent it is derived from gross power.
    pub current_a: Option<f64>,
}

/// Strategy for turning gross power into net power.
pub trait LossPolicy: Send + Sync + Debug {
    /// Power lost at `gross_kw` (kW, never negative, never above `gross_kw`).
    fn loss_kw(&self, gross_kw: f64, conditions: &LossConditions) -> Result<f64, LossParameterError>;
}

/// Multiplicative derating through named stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FractionalDerating {
    stages: Vec<(String, f64)>,
}

impl FractionalDerating {
    pub fn new(stages: Vec<(String, f64)>) -> Result<Self, LossParameterError> {
        for (stage, value) in &stages {
            if !(0.0..1.0).contains(value) {
                return Err(LossParameterError::FractionOutOfRange {
                    stage: stage.clone(),
                    value: *value,
                });
            }
        }
        Ok(Self { stages })
    }

    /// Fraction of gross power that survives every stage.
    pub fn retained_fraction(&self) -> f64 {
        self.stages.iter().map(|(_, f)| 1.0 - f).product()
    }
}

impl LossPolicy for FractionalDerating {
    fn loss_kw(&self, gross_kw: f64, _conditions: &LossConditions) -> Result<f64, LossParameterError> {
        Ok(gross_kw * (1.0 - self.retained_fraction()))
    }
}

/// `phases * I^2 * R` line loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResistiveLoss {
    resistance_ohm: f64,
    line_voltage_v: f64,
    phases: u8,
}

impl ResistiveLoss {
    pub fn new(resistance_ohm: f64, line_voltage_v: f64, phases: u8) -> Result<Self, LossParameterError> {
        if !resistance_ohm.is_finite() || resistance_ohm < 0.0 {
            return Err(LossParameterError::NegativeResistance(resistance_ohm));
        }
        if !line_voltage_v.is_finite() || line_voltage_v <= 0.0 {
            return Err(LossParameterError::NonPositiveVoltage(line_voltage_v));
        }
        if phases != 1 && phases != 3 {
            return Err(LossParameterError::InvalidPhases(phases));
        }
        Ok(Self {
            resistance_ohm,
            line_voltage_v,
            phases,
        })
    }

    /// Resistance of a conductor run: `resistivity * length / area`.
    pub fn from_conductor(
        resistivity_ohm_m: f64,
        length_km: f64,
        cross_section_mm2: f64,
        line_voltage_v: f64,
        phases: u8,
    ) -> Result<Self, LossParameterError> {
        for (parameter, value) in [
            ("resistivity_ohm_m", resistivity_ohm_m),
            ("cross_section_mm2", cross_section_mm2),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(LossParameterError::InvalidConductor { parameter, value });
            }
        }
        if !length_km.is_finite() || length_km < 0.0 {
            return Err(LossParameterError::InvalidConductor {
                parameter: "length_km",
                value: length_km,
            });
        }
        let resistance = resistivity_ohm_m * length_km * 1000.0 / (cross_section_mm2 * 1e-6);
        Self::new(resistance, line_voltage_v, phases)
    }

    pub fn resistance_ohm(&self) -> f64 {
        self.resistance_ohm
    }

    /// Line current carrying `power_kw`.
    pub fn current_a(&self, power_kw: f64) -> f64 {
        let watts = power_kw * 1000.0;
        match self.phases {
            3 => watts / (3f64.sqrt() * self.line_voltage_v),
            _ => watts / self.line_voltage_v,
        }
    }
}

impl LossPolicy for ResistiveLoss {
    fn loss_kw(&self, gross_kw: f64, conditions: &LossConditions) -> Result<f64, LossParameterError> {
        let current = match conditions.current_a {
            Some(i) if !i.is_finite() || i < 0.0 => return Err(LossParameterError::NegativeCurrent(i)),
            Some(i) => i,
            None => self.current_a(gross_kw),
        };
        let loss_w = f64::from(self.phases) * current * current * self.resistance_ohm;
        Ok((loss_w / 1000.0).min(gross_kw))
    }
}

/// Serializable loss configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LossConfig {
    Fractional {
        #[serde(default)]
        transmission: f64,
        #[serde(default)]
        inverter: f64,
        #[serde(default)]
        transformer: f64,
    },
    Resistive {
        resistance_ohm: f64,
        line_voltage_v: f64,
        #[serde(default = "default_phases")]
        phases: u8,
    },
    Conductor {
        length_km: f64,
        line_voltage_v: f64,
        #[serde(default = "default_cross_section")]
        cross_section_mm2: f64,
        #[serde(default = "default_resistivity")]
        resistivity_ohm_m: f64,
        #[serde(default = "default_phases")]
        phases: u8,
    },
}

fn default_phases() -> u8 {
    3
}

fn default_cross_section() -> f64 {
    500.0
}

fn default_resistivity() -> f64 {
    COPPER_RESISTIVITY_OHM_M
}

impl Default for LossConfig {
    fn default() -> Self {
        LossConfig::Fractional {
            transmission: 0.0,
            inverter: 0.0,
            transformer: 0.0,
        }
    }
}

/// A configured loss policy for one feeder.
#[derive(Debug, Clone)]
pub struct LossModel {
    policy: Arc<dyn LossPolicy>,
}

impl LossModel {
    pub fn from_config(config: &LossConfig) -> Result<Self, LossParameterError> {
        let policy: Arc<dyn LossPolicy> = match config {
            LossConfig::Fractional {
                transmission,
                inverter,
                transformer,
            } => Arc::new(FractionalDerating::new(vec![
                ("transmission".to_string(), *transmission),
                ("inverter".to_string(), *inverter),
                ("transformer".to_string(), *transformer),
            ])?),
            LossConfig::Resistive {
                resistance_ohm,
                line_voltage_v,
                phases,
            } => Arc::new(ResistiveLoss::new(*resistance_ohm, *line_voltage_v, *phases)?),
            LossConfig::Conductor {
                length_km,
                line_voltage_v,
                cross_section_mm2,
                resistivity_ohm_m,
                phases,
            } => Arc::new(ResistiveLoss::from_conductor(
                *resistivity_ohm_m,
                *length_km,
                *cross_section_mm2,
                *line_voltage_v,
                *phases,
            )?),
        };
        Ok(Self { policy })
    }

    /// No losses at all.
    pub fn lossless() -> Self {
        Self {
            policy: Arc::new(FractionalDerating { stages: Vec::new() }),
        }
    }

    pub fn with_policy(policy: impl LossPolicy + 'static) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    /// Net power after losses: `0 <= net <= gross`.
    pub fn apply(&self, gross_kw: f64, conditions: &LossConditions) -> Result<f64, LossParameterError> {
        if gross_kw <= 0.0 {
            return Ok(0.0);
        }
        let loss = self.loss_kw(gross_kw, conditions)?;
        Ok((gross_kw - loss).clamp(0.0, gross_kw))
    }

    pub fn loss_kw(&self, gross_kw: f64, conditions: &LossConditions) -> Result<f64, LossParameterError> {
        if gross_kw <= 0.0 {
            return Ok(0.0);
        }
        Ok(self.policy.loss_kw(gross_kw, conditions)?.clamp(0.0, gross_kw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const NO_CONDITIONS: LossConditions = LossConditions { current_a: None };

    #[test]
    fn test_fractional_stages_compose_multiplicatively() {
        let model = LossModel::from_config(&LossConfig::Fractional {
            transmission: 0.05,
            inverter: 0.02,
            transformer: 0.01,
        })
        .unwrap();
        let net = model.apply(1000.0, &NO_CONDITIONS).unwrap();
        assert_relative_eq!(net, 1000.0 * 0.95 * 0.98 * 0.99, epsilon = 1e-9);
    }

    #[rstest]
    #[case(-0.1)]
    #[case(1.0)]
    #[case(1.5)]
    fn test_fraction_outside_unit_interval_rejected(#[case] value: f64) {
        let err = LossModel::from_config(&LossConfig::Fractional {
            transmission: value,
            inverter: 0.0,
            transformer: 0.0,
        })
        .unwrap_err();
        assert!(matches!(err, LossParameterError::FractionOutOfRange { .. }));
    }

    #[test]
    fn test_single_phase_resistive_loss() {
        // 10 kW at 1 kV is 10 A; 10^2 * 2 ohm = 200 W
        let model = LossModel::with_policy(ResistiveLoss::new(2.0, 1000.0, 1).unwrap());
        assert_relative_eq!(model.loss_kw(10.0, &NO_CONDITIONS).unwrap(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(model.apply(10.0, &NO_CONDITIONS).unwrap(), 9.8, epsilon = 1e-12);
    }

    #[test]
    fn test_supplied_current_overrides_derived() {
        let model = LossModel::with_policy(ResistiveLoss::new(1.0, 1000.0, 1).unwrap());
        let conditions = LossConditions { current_a: Some(20.0) };
        assert_relative_eq!(model.loss_kw(50.0, &conditions).unwrap(), 0.4, epsilon = 1e-12);

        let negative = LossConditions { current_a: Some(-1.0) };
        assert_eq!(
            model.apply(50.0, &negative).unwrap_err(),
            LossParameterError::NegativeCurrent(-1.0)
        );
    }

    #[test]
    fn test_resistive_loss_clamped_at_gross() {
        let model = LossModel::with_policy(ResistiveLoss::new(1.0e6, 100.0, 1).unwrap());
        assert_eq!(model.apply(5.0, &NO_CONDITIONS).unwrap(), 0.0);
    }

    #[test]
    fn test_conductor_three_phase_line() {
        // 1000 km of 500 mm2 copper is 33.6 ohm
        let line = ResistiveLoss::from_conductor(COPPER_RESISTIVITY_OHM_M, 1000.0, 500.0, 34_500.0, 3).unwrap();
        assert_relative_eq!(line.resistance_ohm(), 33.6, epsilon = 1e-9);

        let gross_kw = 3500.0;
        let current = gross_kw * 1000.0 / (3f64.sqrt() * 34_500.0);
        let expected_kw = 3.0 * current * current * 33.6 / 1000.0;
        let model = LossModel::with_policy(line);
        assert_relative_eq!(model.loss_kw(gross_kw, &NO_CONDITIONS).unwrap(), expected_kw, epsilon = 1e-9);
    }

    #[rstest]
    #[case(LossConfig::Resistive { resistance_ohm: -1.0, line_voltage_v: 400.0, phases: 3 })]
    #[case(LossConfig::Resistive { resistance_ohm: 1.0, line_voltage_v: 0.0, phases: 3 })]
    #[case(LossConfig::Resistive { resistance_ohm: 1.0, line_voltage_v: 400.0, phases: 2 })]
    #[case(LossConfig::Conductor { length_km: 10.0, line_voltage_v: 400.0, cross_section_mm2: 0.0, resistivity_ohm_m: COPPER_RESISTIVITY_OHM_M, phases: 3 })]
    fn test_invalid_resistive_parameters(#[case] config: LossConfig) {
        assert!(LossModel::from_config(&config).is_err());
    }

    #[test]
    fn test_conductor_config_defaults() {
        let config: LossConfig =
            serde_json::from_str(r#"{"policy":"conductor","length_km":1000.0,"line_voltage_v":34500.0}"#).unwrap();
        assert_eq!(
            config,
            LossConfig::Conductor {
                length_km: 1000.0,
                line_voltage_v: 34_500.0,
                cross_section_mm2: 500.0,
                resistivity_ohm_m: COPPER_RESISTIVITY_OHM_M,
                phases: 3,
            }
        );
    }
}
