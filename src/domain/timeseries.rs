//! # Time Series and Simulation Clock
//!
//! `TimeSeries` holds externally supplied (timestamp, kW) samples, `TimeGrid`
//! is the clock the simulator walks. Both are immutable after construction and
//! are shared by reference between concurrent runs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DataGapError, ProfileError};

/// How a missing timestamp inside a series is filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InterpolationPolicy {
    /// Missing samples are a data gap
    #[default]
    None,
    /// Linear interpolation between the neighbouring samples
    Linear,
    /// Hold the last known value
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Ordered (timestamp, value) samples with strictly increasing timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TimePoint>", into = "Vec<TimePoint>")]
pub struct TimeSeries {
    points: Vec<TimePoint>,
}

impl TimeSeries {
    pub fn new(points: Vec<TimePoint>) -> Result<Self, ProfileError> {
        for (i, p) in points.iter().enumerate() {
            if !p.value.is_finite() {
                return Err(ProfileError::NonFinite {
                    parameter: "series value",
                    value: p.value,
                });
            }
            if i > 0 && p.timestamp <= points[i - 1].timestamp {
                return Err(ProfileError::NonMonotonic { index: i });
            }
        }
        Ok(Self { points })
    }

    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (DateTime<Utc>, f64)>,
    ) -> Result<Self, ProfileError> {
        Self::new(
            pairs
                .into_iter()
                .map(|(timestamp, value)| TimePoint { timestamp, value })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    /// Smallest value in the series, `None` when empty.
    pub fn min_value(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).reduce(f64::min)
    }

    /// Value at `timestamp`, filled according to `policy` when there is no exact sample.
    ///
    /// Timestamps before the first or after the last sample are always a gap.
    pub fn value_at(
        &self,
        series: &str,
        timestamp: DateTime<Utc>,
        policy: InterpolationPolicy,
    ) -> Result<f64, DataGapError> {
        let gap = || DataGapError {
            series: series.to_string(),
            timestamp,
        };

        match self.points.binary_search_by(|p| p.timestamp.cmp(&timestamp)) {
            Ok(idx) => Ok(self.points[idx].value),
            // Outside the covered range
            Err(0) => Err(gap()),
            Err(idx) if idx == self.points.len() => Err(gap()),
            Err(idx) => {
                let before = &self.points[idx - 1];
                let after = &self.points[idx];
                match policy {
                    InterpolationPolicy::None => Err(gap()),
                    InterpolationPolicy::Previous => Ok(before.value),
                    InterpolationPolicy::Linear => {
                        let span = (after.timestamp - before.timestamp).num_milliseconds() as f64;
                        let offset = (timestamp - before.timestamp).num_milliseconds() as f64;
                        let frac = offset / span;
                        Ok(before.value + (after.value - before.value) * frac)
                    }
                }
            }
        }
    }
}

impl TryFrom<Vec<TimePoint>> for TimeSeries {
    type Error = ProfileError;

    fn try_from(points: Vec<TimePoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<TimeSeries> for Vec<TimePoint> {
    fn from(series: TimeSeries) -> Self {
        series.points
    }
}

/// The simulation clock: the timestamps a run visits, in order.
///
/// Step length is the distance to the next timestamp; the final step uses the
/// nominal step so irregular grids still integrate over their last sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    timestamps: Vec<DateTime<Utc>>,
    nominal_step: Duration,
}

impl TimeGrid {
    pub fn uniform(start: DateTime<Utc>, step: Duration, steps: usize) -> Result<Self, ProfileError> {
        if step <= Duration::zero() {
            return Err(ProfileError::NonPositiveStep(step.num_milliseconds()));
        }
        if steps == 0 {
            return Err(ProfileError::EmptyRange);
        }
        let timestamps = (0..steps).map(|i| start + step * i as i32).collect();
        Ok(Self {
            timestamps,
            nominal_step: step,
        })
    }

    pub fn from_timestamps(
        timestamps: Vec<DateTime<Utc>>,
        nominal_step: Duration,
    ) -> Result<Self, ProfileError> {
        if nominal_step <= Duration::zero() {
            return Err(ProfileError::NonPositiveStep(nominal_step.num_milliseconds()));
        }
        if timestamps.is_empty() {
            return Err(ProfileError::EmptyRange);
        }
        if let Some(index) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ProfileError::NonMonotonic { index: index + 1 });
        }
        Ok(Self {
            timestamps,
            nominal_step,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn timestamp(&self, index: usize) -> Option<DateTime<Utc>> {
        self.timestamps.get(index).copied()
    }

    pub fn nominal_step(&self) -> Duration {
        self.nominal_step
    }

    /// Length of step `index` in hours.
    pub fn dt_hours(&self, index: usize) -> f64 {
        let step = match (self.timestamps.get(index), self.timestamps.get(index + 1)) {
            (Some(current), Some(next)) => *next - *current,
            _ => self.nominal_step,
        };
        step.num_milliseconds() as f64 / 3_600_000.0
    }

    /// Total simulated span in hours.
    pub fn total_hours(&self) -> f64 {
        (0..self.len()).map(|i| self.dt_hours(i)).sum()
    }
}
