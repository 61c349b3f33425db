//! Seasonal anomaly detection against per-period-offset averages

use super::ModelState;
use std::collections::HashMap;

/// Default period (168 hours - weekly seasonality)
const DEFAULT_PERIOD_HOURS: i64 = 168;

/// Default deviation, as a fraction of the baseline, that flags an anomaly
const DEFAULT_DEVIATION_FRACTION: f64 = 0.5;

/// Minimum observations before seasonal baselines are meaningful
const MIN_OBSERVATIONS: u64 = 3;

#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Maintains running averages per period offset (hour-of-week by default)
#[derive(Debug, Clone)]
pub struct SeasonalModel {
    period_hours: i64,
    deviation_fraction: f64,
    buckets: HashMap<i64, RunningMean>,
    global: RunningMean,
}

impl SeasonalModel {
    pub fn new(period_hours: i64, deviation_fraction: f64) -> Self {
        Self {
            period_hours,
            deviation_fraction,
            buckets: HashMap::new(),
            global: RunningMean::default(),
        }
    }

    fn offset_of(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(3600).rem_euclid(self.period_hours)
    }

    /// Accumulate a value into its period-offset bucket
    pub fn add_seasonal_data(&mut self, timestamp: i64, value: f64) {
        let offset = self.offset_of(timestamp);
        self.buckets.entry(offset).or_default().push(value);
        self.global.push(value);
    }

    /// Historical average for this timestamp's offset, falling back to the
    /// global mean when the bucket is unseen
    pub fn get_seasonal_baseline(&self, timestamp: i64) -> Option<f64> {
        let offset = self.offset_of(timestamp);
        self.buckets
            .get(&offset)
            .and_then(|b| b.mean())
            .or_else(|| self.global.mean())
    }

    /// Whether a value deviates from its seasonal baseline by more than the
    /// configured fraction
    pub fn is_seasonal_anomaly(&self, timestamp: i64, value: f64) -> bool {
        if self.global.count < MIN_OBSERVATIONS {
            return false;
        }
        let Some(baseline) = self.get_seasonal_baseline(timestamp) else {
            return false;
        };
        (value - baseline).abs() > self.deviation_fraction * baseline.abs().max(f64::EPSILON)
    }

    pub fn observation_count(&self) -> u64 {
        self.global.count
    }

    pub fn state(&self) -> ModelState {
        match self.global.count {
            0 => ModelState::Idle,
            n if n < MIN_OBSERVATIONS => ModelState::Accumulating,
            _ => ModelState::Active,
        }
    }
}

impl Default for SeasonalModel {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_HOURS, DEFAULT_DEVIATION_FRACTION)
    }
}
