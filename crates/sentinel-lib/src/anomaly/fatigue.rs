//! Pattern-fatigue scoring with exponential decay
//!
//! Tracks how recently and frequently a content pattern has been reused.
//! Each usage contributes `decay_factor ^ age_hours`; the raw weighted count
//! is normalized into [0, 1) so repeated recent usage saturates toward 1.0.

use super::ModelState;
use std::collections::HashMap;

/// Default per-hour decay applied to usage weight
const DEFAULT_DECAY_FACTOR: f64 = 0.9;

/// Default score above which a pattern counts as fatigued
const DEFAULT_FATIGUE_THRESHOLD: f64 = 0.7;

/// Cap on usage events retained per pattern key
const MAX_USAGES_PER_KEY: usize = 500;

/// Scores pattern reuse, decaying older usages
#[derive(Debug, Clone)]
pub struct FatigueModel {
    decay_factor: f64,
    fatigue_threshold: f64,
    /// Usage timestamps (unix seconds) per pattern key
    usage: HashMap<String, Vec<i64>>,
}

impl FatigueModel {
    pub fn new(decay_factor: f64, fatigue_threshold: f64) -> Self {
        Self {
            decay_factor,
            fatigue_threshold,
            usage: HashMap::new(),
        }
    }

    /// Record one usage of a pattern
    pub fn record_pattern_usage(&mut self, key: &str, timestamp: i64) {
        let usages = self.usage.entry(key.to_string()).or_default();
        usages.push(timestamp);
        if usages.len() > MAX_USAGES_PER_KEY {
            let excess = usages.len() - MAX_USAGES_PER_KEY;
            usages.drain(..excess);
        }
    }

    /// Fatigue score in [0, 1), evaluated at `now`
    ///
    /// Raw decayed count `r = sum(decay ^ age_hours)` is normalized as
    /// `r / (r + 1)`: strictly increasing with each usage, saturating
    /// toward 1.0.
    pub fn calculate_fatigue_score_at(&self, key: &str, now: i64) -> f64 {
        let Some(usages) = self.usage.get(key) else {
            return 0.0;
        };

        let raw: f64 = usages
            .iter()
            .map(|ts| {
                let age_hours = ((now - ts).max(0) as f64) / 3600.0;
                self.decay_factor.powf(age_hours)
            })
            .sum();

        raw / (raw + 1.0)
    }

    /// Fatigue score evaluated at the current time
    pub fn calculate_fatigue_score(&self, key: &str) -> f64 {
        self.calculate_fatigue_score_at(key, chrono::Utc::now().timestamp())
    }

    pub fn is_pattern_fatigued_at(&self, key: &str, now: i64) -> bool {
        self.calculate_fatigue_score_at(key, now) > self.fatigue_threshold
    }

    pub fn is_pattern_fatigued(&self, key: &str) -> bool {
        self.is_pattern_fatigued_at(key, chrono::Utc::now().timestamp())
    }

    pub fn threshold(&self) -> f64 {
        self.fatigue_threshold
    }

    pub fn pattern_count(&self) -> usize {
        self.usage.len()
    }

    pub fn state(&self, key: &str) -> ModelState {
        match self.usage.get(key).map(Vec::len).unwrap_or(0) {
            0 => ModelState::Idle,
            _ => ModelState::Active,
        }
    }
}

impl Default for FatigueModel {
    fn default() -> Self {
        Self::new(DEFAULT_DECAY_FACTOR, DEFAULT_FATIGUE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unused_pattern_scores_zero() {
        let model = FatigueModel::default();
        assert_eq!(model.calculate_fatigue_score_at("hook-1", 1000), 0.0);
        assert!(!model.is_pattern_fatigued_at("hook-1", 1000));
    }

    #[test]
    fn test_score_strictly_increases_with_usage() {
        let mut model = FatigueModel::default();
        let now = 1_700_000_000;

        let mut last = 0.0;
        for _ in 0..20 {
            model.record_pattern_usage("hook-1", now);
            let score = model.calculate_fatigue_score_at("hook-1", now);
            assert!(score > last);
            assert!(score < 1.0);
            last = score;
        }
    }

    #[test]
    fn test_heavy_reuse_crosses_threshold() {
        let mut model = FatigueModel::new(0.9, 0.7);
        let now = 1_700_000_000;

        for _ in 0..5 {
            model.record_pattern_usage("hook-1", now);
        }

        // raw = 5, score = 5/6 > 0.7
        assert!(model.is_pattern_fatigued_at("hook-1", now));
    }

    #[test]
    fn test_old_usage_decays() {
        let mut model = FatigueModel::new(0.9, 0.7);
        let now = 1_700_000_000;

        // Five usages two days ago carry almost no weight
        for _ in 0..5 {
            model.record_pattern_usage("hook-1", now - 48 * 3600);
        }

        let score = model.calculate_fatigue_score_at("hook-1", now);
        assert!(score < 0.1);
        assert!(!model.is_pattern_fatigued_at("hook-1", now));
    }

    #[test]
    fn test_recent_usage_outweighs_old() {
        let mut model = FatigueModel::default();
        let now = 1_700_000_000;

        model.record_pattern_usage("old", now - 24 * 3600);
        model.record_pattern_usage("recent", now);

        assert!(
            model.calculate_fatigue_score_at("recent", now)
                > model.calculate_fatigue_score_at("old", now)
        );
    }

    #[test]
    fn test_usage_cap_bounds_memory() {
        let mut model = FatigueModel::default();
        for i in 0..(MAX_USAGES_PER_KEY + 100) {
            model.record_pattern_usage("hook-1", i as i64);
        }
        assert_eq!(model.usage["hook-1"].len(), MAX_USAGES_PER_KEY);
    }
}
