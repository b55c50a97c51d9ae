//! # Battery State Machine
//!
//! Owns state of charge and enforces charge/discharge physics. Transitions
//! between `Idle`, `Charging` and `Discharging` are driven only by the decision
//! applied at each step. Every mutation is clamped first and checked after;
//! a bound that still breaks is reported, never corrected.

use serde::{Deserialize, Serialize};

use crate::error::{BatteryConfigError, BatteryInvariantViolation, ViolationKind};

/// Flows below this are treated as zero (kW).
pub const FLOW_EPSILON_KW: f64 = 1e-9;

/// Relative SoC drift snapped back onto a bound instead of being reported.
const SOC_SNAP_TOLERANCE: f64 = 1e-9;

/// Where the round-trip loss is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EfficiencySplit {
    /// `sqrt(rte)` on the way in and on the way out
    #[default]
    Symmetric,
    /// Lossless charging, the full round-trip loss on discharge
    DischargeOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatteryMode {
    #[default]
    Idle,
    Charging,
    Discharging,
}

/// Battery configuration, validated once before a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryParams {
    pub capacity_kwh: f64,
    /// Starting state of charge as a fraction of capacity
    pub initial_soc_fraction: f64,
    pub min_soc_fraction: f64,
    pub max_soc_fraction: f64,
    /// Bus-side charge limit
    pub max_charge_kw: f64,
    /// Storage-side discharge limit
    pub max_discharge_kw: f64,
    pub round_trip_efficiency: f64,
    pub efficiency_split: EfficiencySplit,
}

impl Default for BatteryParams {
    fn default() -> Self {
        // 1.5 MWh pack sized for the 2 MW HPC baseline
        Self {
            capacity_kwh: 1500.0,
            initial_soc_fraction: 0.5,
            min_soc_fraction: 0.1,
            max_soc_fraction: 0.9,
            max_charge_kw: 750.0,
            max_discharge_kw: 750.0,
            round_trip_efficiency: 0.9025,
            efficiency_split: EfficiencySplit::Symmetric,
        }
    }
}

impl BatteryParams {
    pub fn validate(&self) -> Result<(), BatteryConfigError> {
        for (parameter, value) in [
            ("capacity_kwh", self.capacity_kwh),
            ("max_charge_kw", self.max_charge_kw),
            ("max_discharge_kw", self.max_discharge_kw),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BatteryConfigError::Negative { parameter, value });
            }
        }

        let (min, max) = (self.min_soc_fraction, self.max_soc_fraction);
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) || min > max {
            return Err(BatteryConfigError::InvalidSocWindow { min, max });
        }

        if !(min..=max).contains(&self.initial_soc_fraction) {
            return Err(BatteryConfigError::InitialSocOutsideWindow {
                initial: self.initial_soc_fraction,
                min,
                max,
            });
        }

        let rte = self.round_trip_efficiency;
        if !(rte > 0.0 && rte <= 1.0) {
            return Err(BatteryConfigError::EfficiencyOutOfRange(rte));
        }

        Ok(())
    }

    pub fn min_soc_kwh(&self) -> f64 {
        self.min_soc_fraction * self.capacity_kwh
    }

    pub fn max_soc_kwh(&self) -> f64 {
        self.max_soc_fraction * self.capacity_kwh
    }

    /// (charge, discharge) efficiency according to the configured split.
    pub fn efficiencies(&self) -> (f64, f64) {
        match self.efficiency_split {
            EfficiencySplit::Symmetric => {
                let one_way = self.round_trip_efficiency.sqrt();
                (one_way, one_way)
            }
            EfficiencySplit::DischargeOnly => (1.0, self.round_trip_efficiency),
        }
    }
}

/// Snapshot of the battery handed to strategies and recorded per step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    pub soc_kwh: f64,
    pub mode: BatteryMode,
    pub capacity_kwh: f64,
    pub min_soc_kwh: f64,
    pub max_soc_kwh: f64,
    pub max_charge_kw: f64,
    pub max_discharge_kw: f64,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
}

impl BatteryState {
    pub fn soc_fraction(&self) -> f64 {
        if self.capacity_kwh > 0.0 {
            self.soc_kwh / self.capacity_kwh
        } else {
            0.0
        }
    }

    /// Bus-side power the battery can absorb over `dt_hours`.
    pub fn charge_acceptance_kw(&self, dt_hours: f64) -> f64 {
        if dt_hours <= 0.0 {
            return 0.0;
        }
        let headroom = (self.max_soc_kwh - self.soc_kwh).max(0.0);
        self.max_charge_kw
            .min(headroom / (dt_hours * self.charge_efficiency))
            .max(0.0)
    }

    /// Storage-side power the battery can release over `dt_hours`.
    pub fn available_discharge_kw(&self, dt_hours: f64) -> f64 {
        if dt_hours <= 0.0 {
            return 0.0;
        }
        let available = (self.soc_kwh - self.min_soc_kwh).max(0.0);
        self.max_discharge_kw.min(available / dt_hours).max(0.0)
    }
}

/// The per-run battery. Exactly one writer: the simulator applying decisions.
#[derive(Debug, Clone)]
pub struct BatteryModel {
    state: BatteryState,
}

impl BatteryModel {
    pub fn new(params: &BatteryParams) -> Result<Self, BatteryConfigError> {
        params.validate()?;
        let (charge_efficiency, discharge_efficiency) = params.efficiencies();
        Ok(Self {
            state: BatteryState {
                soc_kwh: params.initial_soc_fraction * params.capacity_kwh,
                mode: BatteryMode::Idle,
                capacity_kwh: params.capacity_kwh,
                min_soc_kwh: params.min_soc_kwh(),
                max_soc_kwh: params.max_soc_kwh(),
                max_charge_kw: params.max_charge_kw,
                max_discharge_kw: params.max_discharge_kw,
                charge_efficiency,
                discharge_efficiency,
            },
        })
    }

    pub fn state(&self) -> BatteryState {
        self.state
    }

    pub fn soc_kwh(&self) -> f64 {
        self.state.soc_kwh
    }

    pub fn mode(&self) -> BatteryMode {
        self.state.mode
    }

    /// Charge with `power_kw` offered at the bus for `dt_hours`.
    ///
    /// Returns the bus-side power actually accepted. Stored energy grows by
    /// `actual * dt * charge_efficiency`.
    pub fn charge(&mut self, power_kw: f64, dt_hours: f64) -> Result<f64, BatteryInvariantViolation> {
        self.check_request(power_kw, dt_hours)?;

        let mut actual = power_kw.min(self.state.charge_acceptance_kw(dt_hours));
        if actual < FLOW_EPSILON_KW {
            actual = 0.0;
        }

        self.state.soc_kwh += actual * dt_hours * self.state.charge_efficiency;
        self.state.mode = if actual > 0.0 {
            BatteryMode::Charging
        } else {
            BatteryMode::Idle
        };

        self.check_bounds(power_kw, actual)?;
        Ok(actual)
    }

    /// Discharge `power_kw` from storage for `dt_hours`.
    ///
    /// Returns the storage-side power actually drawn; the bus receives
    /// `actual * discharge_efficiency`.
    pub fn discharge(&mut self, power_kw: f64, dt_hours: f64) -> Result<f64, BatteryInvariantViolation> {
        self.check_request(power_kw, dt_hours)?;

        let mut actual = power_kw.min(self.state.available_discharge_kw(dt_hours));
        if actual < FLOW_EPSILON_KW {
            actual = 0.0;
        }

        self.state.soc_kwh -= actual * dt_hours;
        self.state.mode = if actual > 0.0 {
            BatteryMode::Discharging
        } else {
            BatteryMode::Idle
        };

        self.check_bounds(power_kw, actual)?;
        Ok(actual)
    }

    pub fn idle(&mut self) {
        self.state.mode = BatteryMode::Idle;
    }

    fn check_request(&self, power_kw: f64, dt_hours: f64) -> Result<(), BatteryInvariantViolation> {
        if power_kw.is_finite() && power_kw >= 0.0 && dt_hours.is_finite() && dt_hours > 0.0 {
            return Ok(());
        }
        Err(self.violation(ViolationKind::InvalidRequest, power_kw, 0.0))
    }

    fn check_bounds(&mut self, requested_kw: f64, actual_kw: f64) -> Result<(), BatteryInvariantViolation> {
        let BatteryState {
            soc_kwh,
            min_soc_kwh,
            max_soc_kwh,
            capacity_kwh,
            ..
        } = self.state;
        let snap = SOC_SNAP_TOLERANCE * capacity_kwh.max(1.0);

        if soc_kwh < min_soc_kwh {
            if min_soc_kwh - soc_kwh <= snap {
                self.state.soc_kwh = min_soc_kwh;
            } else {
                return Err(self.violation(ViolationKind::SocOutOfBounds, requested_kw, actual_kw));
            }
        } else if soc_kwh > max_soc_kwh {
            if soc_kwh - max_soc_kwh <= snap {
                self.state.soc_kwh = max_soc_kwh;
            } else {
                return Err(self.violation(ViolationKind::SocOutOfBounds, requested_kw, actual_kw));
            }
        } else if !soc_kwh.is_finite() {
            return Err(self.violation(ViolationKind::SocOutOfBounds, requested_kw, actual_kw));
        }
        Ok(())
    }

    fn violation(&self, kind: ViolationKind, requested_kw: f64, actual_kw: f64) -> BatteryInvariantViolation {
        BatteryInvariantViolation {
            kind,
            step: None,
            timestamp: None,
            requested_kw,
            actual_kw,
            soc_kwh: self.state.soc_kwh,
            min_soc_kwh: self.state.min_soc_kwh,
            max_soc_kwh: self.state.max_soc_kwh,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_soc(&mut self, soc_kwh: f64) {
        self.state.soc_kwh = soc_kwh;
    }
}
