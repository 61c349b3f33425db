//! Z-score anomaly model over a fixed-capacity ring buffer

use super::ModelState;
use std::collections::VecDeque;

/// Default ring buffer capacity
const DEFAULT_WINDOW_SIZE: usize = 50;

/// Default z-score threshold
const DEFAULT_THRESHOLD: f64 = 2.0;

/// Minimum points before a score is meaningful
const MIN_POINTS: usize = 2;

/// Flags values whose z-score against the current window exceeds a threshold
#[derive(Debug, Clone)]
pub struct StatisticalModel {
    window_size: usize,
    threshold: f64,
    buffer: VecDeque<f64>,
}

impl StatisticalModel {
    pub fn new(window_size: usize, threshold: f64) -> Self {
        Self {
            window_size,
            threshold,
            buffer: VecDeque::with_capacity(window_size),
        }
    }

    /// Push a point, evicting the oldest beyond the window size
    pub fn add_data_point(&mut self, value: f64) {
        while self.buffer.len() >= self.window_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn mean(&self) -> f64 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        self.buffer.iter().sum::<f64>() / self.buffer.len() as f64
    }

    /// Sample standard deviation (Bessel's correction)
    pub fn std_dev(&self) -> f64 {
        let n = self.buffer.len();
        if n < MIN_POINTS {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .buffer
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        variance.sqrt()
    }

    /// Z-score of a probe value against the current buffer
    ///
    /// Short history or zero spread resolves to 0.0 - not anomalous - so a
    /// flat window never produces divide-by-zero false positives.
    pub fn calculate_anomaly_score(&self, value: f64) -> f64 {
        if self.buffer.len() < MIN_POINTS {
            return 0.0;
        }
        let std_dev = self.std_dev();
        if std_dev < f64::EPSILON {
            return 0.0;
        }
        (value - self.mean()).abs() / std_dev
    }

    pub fn is_anomaly(&self, value: f64) -> bool {
        self.calculate_anomaly_score(value) > self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn state(&self) -> ModelState {
        match self.buffer.len() {
            0 => ModelState::Idle,
            n if n < MIN_POINTS => ModelState::Accumulating,
            _ => ModelState::Active,
        }
    }
}

impl Default for StatisticalModel {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE, DEFAULT_THRESHOLD)
    }
}
