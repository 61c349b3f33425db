//! Observability infrastructure for the cost sentinel
//!
//! Provides:
//! - Prometheus metrics (track-path latency, cost counters, anomaly and
//!   alert dispatch counters)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for the track-path latency (in seconds); the write path
/// targets sub-second p99
const TRACK_LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    track_latency_seconds: Histogram,
    cost_events_total: IntCounterVec,
    cost_events_rejected_total: IntCounter,
    anomalies_detected_total: IntCounterVec,
    alert_results_total: IntCounterVec,
    work_units_tracked: IntGauge,
    metric_store_keys: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            track_latency_seconds: register_histogram!(
                "cost_sentinel_track_latency_seconds",
                "Time spent on the cost-tracking write path",
                TRACK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register track_latency_seconds"),

            cost_events_total: register_int_counter_vec!(
                "cost_sentinel_cost_events_total",
                "Cost events recorded, by resource type",
                &["resource_type"]
            )
            .expect("Failed to register cost_events_total"),

            cost_events_rejected_total: register_int_counter!(
                "cost_sentinel_cost_events_rejected_total",
                "Tracking calls rejected for invalid amounts or missing fields"
            )
            .expect("Failed to register cost_events_rejected_total"),

            anomalies_detected_total: register_int_counter_vec!(
                "cost_sentinel_anomalies_detected_total",
                "Anomalies flagged, by type and severity",
                &["anomaly_type", "severity"]
            )
            .expect("Failed to register anomalies_detected_total"),

            alert_results_total: register_int_counter_vec!(
                "cost_sentinel_alert_results_total",
                "Alert channel dispatch outcomes",
                &["channel", "status"]
            )
            .expect("Failed to register alert_results_total"),

            work_units_tracked: register_int_gauge!(
                "cost_sentinel_work_units_tracked",
                "Number of work units with attributed cost"
            )
            .expect("Failed to register work_units_tracked"),

            metric_store_keys: register_int_gauge!(
                "cost_sentinel_metric_store_keys",
                "Number of rolling metric windows currently held"
            )
            .expect("Failed to register metric_store_keys"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Cheap handle to the global instance; clones share the same metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a metrics handle (initializes global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a track-path latency observation
    pub fn observe_track_latency(&self, duration_secs: f64) {
        self.inner().track_latency_seconds.observe(duration_secs);
    }

    /// Count one recorded cost event
    pub fn inc_cost_events(&self, resource_type: &str) {
        self.inner()
            .cost_events_total
            .with_label_values(&[resource_type])
            .inc();
    }

    /// Count one rejected tracking call
    pub fn inc_cost_events_rejected(&self) {
        self.inner().cost_events_rejected_total.inc();
    }

    #[cfg(test)]
    pub(crate) fn cost_events_rejected_count(&self) -> u64 {
        self.inner().cost_events_rejected_total.get()
    }

    /// Count one flagged anomaly
    pub fn inc_anomalies_detected(&self, anomaly_type: &str, severity: &str) {
        self.inner()
            .anomalies_detected_total
            .with_label_values(&[anomaly_type, severity])
            .inc();
    }

    /// Count one channel dispatch outcome
    pub fn inc_alert_result(&self, channel: &str, status: &str) {
        self.inner()
            .alert_results_total
            .with_label_values(&[channel, status])
            .inc();
    }

    /// Update the tracked work-unit count
    pub fn set_work_units_tracked(&self, count: i64) {
        self.inner().work_units_tracked.set(count);
    }

    /// Update the rolling-store key count
    pub fn set_metric_store_keys(&self, count: i64) {
        self.inner().metric_store_keys.set(count);
    }
}

/// Structured logger for engine events
///
/// Consistent JSON-shaped logging for cost events, anomalies, and alert
/// dispatch outcomes.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Log a recorded cost event
    pub fn log_cost_event(
        &self,
        resource_type: &str,
        persona_id: &str,
        work_id: &str,
        operation: &str,
        amount_usd: f64,
    ) {
        info!(
            event = "cost_recorded",
            service = %self.service_name,
            resource_type = %resource_type,
            persona_id = %persona_id,
            work_id = %work_id,
            operation = %operation,
            amount_usd = amount_usd,
            "Cost event recorded"
        );
    }

    /// Log a rejected tracking call; the caller swallows the error
    pub fn log_tracking_rejected(&self, resource_type: &str, work_id: &str, reason: &str) {
        warn!(
            event = "cost_rejected",
            service = %self.service_name,
            resource_type = %resource_type,
            work_id = %work_id,
            reason = %reason,
            "Tracking call rejected, event dropped"
        );
    }

    /// Log a detected anomaly at a severity-dependent level
    pub fn log_anomaly(
        &self,
        metric_name: &str,
        anomaly_type: &str,
        severity: &str,
        current_value: f64,
        baseline_value: Option<f64>,
        message: &str,
    ) {
        match severity {
            "critical" => {
                warn!(
                    event = "anomaly_detected",
                    service = %self.service_name,
                    metric_name = %metric_name,
                    anomaly_type = %anomaly_type,
                    severity = %severity,
                    current_value = current_value,
                    baseline_value = ?baseline_value,
                    message = %message,
                    "Critical anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    service = %self.service_name,
                    metric_name = %metric_name,
                    anomaly_type = %anomaly_type,
                    severity = %severity,
                    current_value = current_value,
                    baseline_value = ?baseline_value,
                    message = %message,
                    "Anomaly detected"
                );
            }
        }
    }

    /// Log one channel dispatch outcome
    pub fn log_alert_dispatch(
        &self,
        channel: &str,
        status: &str,
        reason: Option<&str>,
        latency_ms: u64,
    ) {
        match status {
            "failed" => {
                warn!(
                    event = "alert_dispatched",
                    service = %self.service_name,
                    channel = %channel,
                    status = %status,
                    reason = ?reason,
                    latency_ms = latency_ms,
                    "Alert channel delivery failed"
                );
            }
            _ => {
                info!(
                    event = "alert_dispatched",
                    service = %self.service_name,
                    channel = %channel,
                    status = %status,
                    reason = ?reason,
                    latency_ms = latency_ms,
                    "Alert channel dispatch complete"
                );
            }
        }
    }

    /// Log engine startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "engine_started",
            service = %self.service_name,
            version = %version,
            "Cost sentinel started"
        );
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            service = %self.service_name,
            reason = %reason,
            "Cost sentinel shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metrics_creation() {
        // Metrics register once against the global Prometheus registry;
        // a second handle reuses the same families.
        let metrics = EngineMetrics::new();

        metrics.observe_track_latency(0.001);
        metrics.inc_cost_events("llm");
        metrics.inc_cost_events_rejected();
        metrics.inc_anomalies_detected("cost_threshold", "warning");
        metrics.inc_alert_result("slack", "success");
        metrics.set_work_units_tracked(3);
        metrics.set_metric_store_keys(12);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-sentinel");
        assert_eq!(logger.service_name, "test-sentinel");
    }
}
