use serde::{Deserialize, Serialize};

/// Limits and objective knobs for the horizon program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConstraints {
    /// Grid interconnect import limit (kW). `None` = unlimited.
    pub max_grid_import_kw: Option<f64>,
    /// Cost per kWh of battery throughput; keeps the LP from charging and discharging at once
    pub throughput_penalty: f64,
    /// Value per kWh left in storage at the end of the horizon. Defaults to `0.5 * min(price) * eta_d`.
    pub terminal_value_per_kwh: Option<f64>,
}

impl Default for DispatchConstraints {
    fn default() -> Self {
        Self {
            max_grid_import_kw: None,
            throughput_penalty: 1e-4,
            terminal_value_per_kwh: None,
        }
    }
}

impl DispatchConstraints {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(limit) = self.max_grid_import_kw {
            if !limit.is_finite() || limit < 0.0 {
                return Err(format!("max_grid_import_kw must be non-negative, got {limit}"));
            }
        }
        if !self.throughput_penalty.is_finite() || self.throughput_penalty < 0.0 {
            return Err(format!(
                "throughput_penalty must be non-negative, got {}",
                self.throughput_penalty
            ));
        }
        if let Some(value) = self.terminal_value_per_kwh {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("terminal_value_per_kwh must be non-negative, got {value}"));
            }
        }
        Ok(())
    }
}
