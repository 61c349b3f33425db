//! Trend-break detection over hourly-bucketed aggregates

use super::ModelState;
use std::collections::BTreeMap;

/// Default lookback window (24 hours)
const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Default relative deviation to flag a break
const DEFAULT_TREND_THRESHOLD: f64 = 0.3;

/// Minimum populated buckets before a baseline is meaningful
const MIN_BUCKETS: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
struct HourBucket {
    sum: f64,
    count: u64,
}

impl HourBucket {
    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Flags values deviating from the mean of recent hourly buckets
#[derive(Debug, Clone)]
pub struct TrendModel {
    lookback_hours: i64,
    trend_threshold: f64,
    /// Keyed by hour index (unix seconds / 3600), ordered so expiry is a
    /// cheap range split
    buckets: BTreeMap<i64, HourBucket>,
}

impl TrendModel {
    pub fn new(lookback_hours: i64, trend_threshold: f64) -> Self {
        Self {
            lookback_hours,
            trend_threshold,
            buckets: BTreeMap::new(),
        }
    }

    /// Accumulate a value into its hour bucket, dropping buckets outside the
    /// lookback window
    pub fn add_hourly_data(&mut self, timestamp: i64, value: f64) {
        let hour = timestamp.div_euclid(3600);
        let bucket = self.buckets.entry(hour).or_default();
        bucket.sum += value;
        bucket.count += 1;

        let cutoff = hour - self.lookback_hours;
        self.buckets = self.buckets.split_off(&(cutoff + 1));
    }

    /// Mean over retained hourly buckets; `None` until enough history
    pub fn calculate_baseline(&self) -> Option<f64> {
        if self.buckets.len() < MIN_BUCKETS {
            return None;
        }
        let sum: f64 = self.buckets.values().map(|b| b.mean()).sum();
        Some(sum / self.buckets.len() as f64)
    }

    /// Whether a value breaks from the baseline by more than the threshold
    ///
    /// Insufficient history resolves to `false`, not an error.
    pub fn detect_trend_break(&self, value: f64) -> bool {
        let Some(baseline) = self.calculate_baseline() else {
            return false;
        };
        self.deviation_from(baseline, value) > self.trend_threshold
    }

    /// Relative deviation of a value from a baseline, epsilon-guarded
    pub fn deviation_from(&self, baseline: f64, value: f64) -> f64 {
        (value - baseline).abs() / baseline.abs().max(f64::EPSILON)
    }

    pub fn threshold(&self) -> f64 {
        self.trend_threshold
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn state(&self) -> ModelState {
        match self.buckets.len() {
            0 => ModelState::Idle,
            n if n < MIN_BUCKETS => ModelState::Accumulating,
            _ => ModelState::Active,
        }
    }
}

impl Default for TrendModel {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK_HOURS, DEFAULT_TREND_THRESHOLD)
    }
}
