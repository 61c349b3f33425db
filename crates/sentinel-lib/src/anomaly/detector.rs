//! Composite anomaly detector
//!
//! Wires the four models to domain-level checks (cost overruns, engagement
//! drops, pattern fatigue) and scans the rolling metric store. Every
//! evaluation is O(window size); degenerate inputs resolve to "not
//! anomalous" rather than raising.

use super::{FatigueModel, SeasonalModel, StatisticalModel, TrendModel};
use crate::models::{AnomalyResult, AnomalyType, Severity};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::store::{MetricStore, WindowSnapshot};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Metric fed by engagement tracking; a drop here is an engagement anomaly
pub const VIRAL_COEFFICIENT_METRIC: &str = "viral_coefficient";

use crate::cost::COST_PER_POST_METRIC;

/// Tunable thresholds for all models and severity cutoffs
///
/// Numeric cutoffs are defaults, not fixed requirements; they are injected
/// here rather than read from process-wide state.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Expected ceiling for cost per work unit, USD
    pub cost_threshold_per_work_unit: f64,
    /// Cost above `baseline * multiplier` is flagged
    pub alert_threshold_multiplier: f64,
    /// Cost above `baseline * critical_multiplier` is critical
    pub critical_cost_multiplier: f64,
    /// Engagement drop fraction that warrants a warning
    pub viral_drop_fraction: f64,
    /// Engagement drop fraction that warrants critical severity
    pub critical_drop_fraction: f64,
    /// Statistical model ring buffer size
    pub window_size: usize,
    /// Statistical model z-score threshold
    pub stat_threshold: f64,
    /// Trend model lookback
    pub lookback_hours: i64,
    /// Trend model relative deviation threshold
    pub trend_threshold: f64,
    /// Seasonal period length
    pub period_hours: i64,
    /// Seasonal deviation fraction
    pub seasonal_deviation_fraction: f64,
    /// Fatigue decay per hour
    pub decay_factor: f64,
    /// Fatigue score threshold
    pub fatigue_threshold: f64,
    /// Retained audit entries
    pub audit_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cost_threshold_per_work_unit: 0.02,
            alert_threshold_multiplier: 2.0,
            critical_cost_multiplier: 3.0,
            viral_drop_fraction: 0.3,
            critical_drop_fraction: 0.5,
            window_size: 50,
            stat_threshold: 2.0,
            lookback_hours: 24,
            trend_threshold: 0.3,
            period_hours: 168,
            seasonal_deviation_fraction: 0.5,
            decay_factor: 0.9,
            fatigue_threshold: 0.7,
            audit_capacity: 1000,
        }
    }
}

/// Composite detector over all anomaly models
pub struct AnomalyDetector {
    config: DetectorConfig,
    fatigue: Mutex<FatigueModel>,
    audit: Mutex<VecDeque<AnomalyResult>>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let fatigue = FatigueModel::new(config.decay_factor, config.fatigue_threshold);
        Self {
            config,
            fatigue: Mutex::new(fatigue),
            audit: Mutex::new(VecDeque::new()),
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("anomaly-detector"),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Flag a cost running above its baseline by more than the configured
    /// multiplier; severity scales with the overrun ratio
    pub fn detect_cost_anomaly(
        &self,
        current: f64,
        baseline: f64,
        key: &str,
    ) -> Option<AnomalyResult> {
        if baseline <= f64::EPSILON || !current.is_finite() {
            return None;
        }

        let ratio = current / baseline;
        if ratio <= self.config.alert_threshold_multiplier {
            return None;
        }

        let severity = if ratio >= self.config.critical_cost_multiplier {
            Severity::Critical
        } else {
            Severity::Warning
        };
        let confidence = (ratio / self.config.critical_cost_multiplier).min(1.0);

        Some(self.flag(AnomalyResult {
            metric_name: key.to_string(),
            anomaly_type: AnomalyType::CostThreshold,
            severity,
            current_value: current,
            baseline_value: Some(baseline),
            confidence,
            message: format!(
                "cost {:.4} USD is {:.1}x the baseline {:.4} USD",
                current, ratio, baseline
            ),
            detected_at: chrono::Utc::now().timestamp(),
            alert_sent: false,
        }))
    }

    /// Flag an engagement (viral coefficient) drop beyond the configured
    /// fraction; severity scales with drop magnitude
    pub fn detect_viral_coefficient_drop(
        &self,
        current: f64,
        baseline: f64,
        key: &str,
    ) -> Option<AnomalyResult> {
        if baseline <= f64::EPSILON || !current.is_finite() {
            return None;
        }

        let drop = (baseline - current) / baseline;
        if drop <= self.config.viral_drop_fraction {
            return None;
        }

        let severity = if drop >= self.config.critical_drop_fraction {
            Severity::Critical
        } else {
            Severity::Warning
        };
        let confidence = (drop / self.config.critical_drop_fraction).min(1.0);

        Some(self.flag(AnomalyResult {
            metric_name: key.to_string(),
            anomaly_type: AnomalyType::EngagementDrop,
            severity,
            current_value: current,
            baseline_value: Some(baseline),
            confidence,
            message: format!(
                "viral coefficient dropped {:.0}% below baseline {:.3}",
                drop * 100.0,
                baseline
            ),
            detected_at: chrono::Utc::now().timestamp(),
            alert_sent: false,
        }))
    }

    /// Record one usage of a content pattern for fatigue scoring
    pub fn record_pattern_usage(&self, key: &str, timestamp: i64) {
        self.fatigue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_pattern_usage(key, timestamp);
    }

    /// Flag a pattern whose decayed usage score crossed the fatigue threshold
    pub fn detect_pattern_fatigue(&self, key: &str) -> Option<AnomalyResult> {
        self.detect_pattern_fatigue_at(key, chrono::Utc::now().timestamp())
    }

    pub fn detect_pattern_fatigue_at(&self, key: &str, now: i64) -> Option<AnomalyResult> {
        let fatigue = self.fatigue.lock().unwrap_or_else(|e| e.into_inner());
        let score = fatigue.calculate_fatigue_score_at(key, now);
        if score <= self.config.fatigue_threshold {
            return None;
        }
        drop(fatigue);

        Some(self.flag(AnomalyResult {
            metric_name: key.to_string(),
            anomaly_type: AnomalyType::Fatigue,
            severity: Severity::Warning,
            current_value: score,
            baseline_value: Some(self.config.fatigue_threshold),
            confidence: score,
            message: format!("pattern '{}' fatigue score {:.2} above threshold", key, score),
            detected_at: now,
            alert_sent: false,
        }))
    }

    /// Evaluate every window in the store (optionally limited to one scope)
    /// and return all flagged anomalies
    ///
    /// Each window is evaluated against the models rebuilt from its own
    /// snapshot, so one scan is O(keys * window size) and two concurrent
    /// scans of a key see consistent views.
    pub fn scan(&self, store: &MetricStore, scope: Option<&str>) -> Vec<AnomalyResult> {
        let keys = match scope {
            Some(scope) => store.keys_for_scope(scope),
            None => store.keys(),
        };

        let mut results = Vec::new();
        for key in keys {
            let Some(snapshot) = store.snapshot(&key.metric, &key.scope) else {
                continue;
            };
            self.evaluate_window(&snapshot, &mut results);
        }
        results
    }

    fn evaluate_window(&self, snapshot: &WindowSnapshot, results: &mut Vec<AnomalyResult>) {
        let points = &snapshot.points;
        if points.len() < 2 {
            return;
        }
        let (probe_ts, probe) = points[points.len() - 1];
        let history = &points[..points.len() - 1];
        let label = format!("{}:{}", snapshot.key.metric, snapshot.key.scope);

        if let Some(result) = self.evaluate_statistical(history, probe, &label) {
            results.push(result);
        }
        if let Some(result) = self.evaluate_trend(history, probe, &label) {
            results.push(result);
        }
        if let Some(result) = self.evaluate_seasonal(history, probe_ts, probe, &label) {
            results.push(result);
        }

        let history_mean =
            history.iter().map(|(_, v)| v).sum::<f64>() / history.len() as f64;
        match snapshot.key.metric.as_str() {
            COST_PER_POST_METRIC => {
                let baseline = history_mean.max(self.config.cost_threshold_per_work_unit);
                if let Some(result) = self.detect_cost_anomaly(probe, baseline, &label) {
                    results.push(result);
                }
            }
            VIRAL_COEFFICIENT_METRIC => {
                if let Some(result) =
                    self.detect_viral_coefficient_drop(probe, history_mean, &label)
                {
                    results.push(result);
                }
            }
            _ => {}
        }
    }

    fn evaluate_statistical(
        &self,
        history: &[(i64, f64)],
        probe: f64,
        label: &str,
    ) -> Option<AnomalyResult> {
        let mut model = StatisticalModel::new(self.config.window_size, self.config.stat_threshold);
        for (_, v) in history {
            model.add_data_point(*v);
        }
        if !model.is_anomaly(probe) {
            return None;
        }

        let score = model.calculate_anomaly_score(probe);
        let severity = if score >= 2.0 * self.config.stat_threshold {
            Severity::Critical
        } else {
            Severity::Warning
        };

        Some(self.flag(AnomalyResult {
            metric_name: label.to_string(),
            anomaly_type: AnomalyType::Statistical,
            severity,
            current_value: probe,
            baseline_value: Some(model.mean()),
            confidence: (score / (2.0 * self.config.stat_threshold)).min(1.0),
            message: format!("value {:.4} is {:.1} std devs from the window mean", probe, score),
            detected_at: chrono::Utc::now().timestamp(),
            alert_sent: false,
        }))
    }

    fn evaluate_trend(
        &self,
        history: &[(i64, f64)],
        probe: f64,
        label: &str,
    ) -> Option<AnomalyResult> {
        let mut model = TrendModel::new(self.config.lookback_hours, self.config.trend_threshold);
        for (ts, v) in history {
            model.add_hourly_data(*ts, *v);
        }
        if !model.detect_trend_break(probe) {
            return None;
        }

        let baseline = model.calculate_baseline()?;
        let deviation = model.deviation_from(baseline, probe);

        Some(self.flag(AnomalyResult {
            metric_name: label.to_string(),
            anomaly_type: AnomalyType::Trend,
            severity: Severity::Warning,
            current_value: probe,
            baseline_value: Some(baseline),
            confidence: (deviation / (2.0 * self.config.trend_threshold)).min(1.0),
            message: format!(
                "value {:.4} deviates {:.0}% from the {}h baseline",
                probe,
                deviation * 100.0,
                self.config.lookback_hours
            ),
            detected_at: chrono::Utc::now().timestamp(),
            alert_sent: false,
        }))
    }

    fn evaluate_seasonal(
        &self,
        history: &[(i64, f64)],
        probe_ts: i64,
        probe: f64,
        label: &str,
    ) -> Option<AnomalyResult> {
        let mut model = SeasonalModel::new(
            self.config.period_hours,
            self.config.seasonal_deviation_fraction,
        );
        for (ts, v) in history {
            model.add_seasonal_data(*ts, *v);
        }
        if !model.is_seasonal_anomaly(probe_ts, probe) {
            return None;
        }

        let baseline = model.get_seasonal_baseline(probe_ts)?;

        Some(self.flag(AnomalyResult {
            metric_name: label.to_string(),
            anomaly_type: AnomalyType::Seasonal,
            severity: Severity::Warning,
            current_value: probe,
            baseline_value: Some(baseline),
            confidence: ((probe - baseline).abs()
                / (baseline.abs().max(f64::EPSILON) * 2.0 * self.config.seasonal_deviation_fraction))
                .min(1.0),
            message: format!(
                "value {:.4} off the seasonal baseline {:.4} for this period offset",
                probe, baseline
            ),
            detected_at: chrono::Utc::now().timestamp(),
            alert_sent: false,
        }))
    }

    /// Flagged results retained for audit, newest last
    pub fn audit_log(&self) -> Vec<AnomalyResult> {
        let audit = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        audit.iter().cloned().collect()
    }

    /// Mark the audit entry for a dispatched result as sent
    pub fn mark_alert_sent(&self, result: &AnomalyResult) {
        let mut audit = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        for entry in audit.iter_mut() {
            if entry.detected_at == result.detected_at
                && entry.metric_name == result.metric_name
                && entry.anomaly_type == result.anomaly_type
            {
                entry.alert_sent = true;
            }
        }
    }

    fn flag(&self, result: AnomalyResult) -> AnomalyResult {
        self.metrics.inc_anomalies_detected(
            &result.anomaly_type.to_string(),
            &result.severity.to_string(),
        );
        self.logger.log_anomaly(
            &result.metric_name,
            &result.anomaly_type.to_string(),
            &result.severity.to_string(),
            result.current_value,
            result.baseline_value,
            &result.message,
        );

        let mut audit = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        while audit.len() >= self.config.audit_capacity {
            audit.pop_front();
        }
        audit.push_back(result.clone());

        result
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
