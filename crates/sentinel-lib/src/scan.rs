//! Background anomaly scan loop
//!
//! Periodically runs the composite detector over the rolling metric store
//! and pushes flagged anomalies through the alert manager. Alert dispatch
//! happens inside the same cycle so severities reach the channels while
//! the data is fresh.

use crate::alert::AlertManager;
use crate::anomaly::AnomalyDetector;
use crate::health::{components, HealthRegistry};
use crate::models::ChannelStatus;
use crate::store::MetricStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

/// Configuration for the scan loop
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Base scan interval (default: 30 seconds)
    pub interval: Duration,
    /// Channels every flagged anomaly is dispatched to
    pub alert_channels: Vec<String>,
    /// Minimum severity that triggers alert dispatch
    pub alert_min_severity: crate::models::Severity,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            alert_channels: Vec::new(),
            alert_min_severity: crate::models::Severity::Warning,
        }
    }
}

/// Periodic scan over the metric store with inline alert dispatch
pub struct ScanLoop {
    detector: Arc<AnomalyDetector>,
    store: Arc<MetricStore>,
    alerter: Arc<AlertManager>,
    config: ScanConfig,
    health: Option<Arc<HealthRegistry>>,
}

impl ScanLoop {
    pub fn new(
        detector: Arc<AnomalyDetector>,
        store: Arc<MetricStore>,
        alerter: Arc<AlertManager>,
        config: ScanConfig,
    ) -> Self {
        Self {
            detector,
            store,
            alerter,
            config,
            health: None,
        }
    }

    /// Report heartbeats into the given registry after every scan cycle
    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until a shutdown signal is received
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            channels = ?self.config.alert_channels,
            "Starting anomaly scan loop"
        );

        let mut ticker = interval(self.config.interval);
        let mut cycle_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let (flagged, dispatched) = self.run_cycle().await;
                    cycle_count += 1;

                    if flagged > 0 || cycle_count % 10 == 0 {
                        debug!(
                            cycle = cycle_count,
                            flagged = flagged,
                            dispatched = dispatched,
                            elapsed_ms = start.elapsed().as_millis(),
                            "Scan cycle complete"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down anomaly scan loop");
                    break;
                }
            }
        }
    }

    /// One scan cycle: detect everywhere, dispatch what crossed the bar
    pub async fn run_cycle(&self) -> (usize, usize) {
        let results = self.detector.scan(&self.store, None);
        let flagged = results.len();
        let mut dispatched = 0usize;
        let mut undeliverable = 0usize;

        for result in &results {
            if result.severity < self.config.alert_min_severity
                || self.config.alert_channels.is_empty()
            {
                continue;
            }

            let outcomes = self
                .alerter
                .send_alert(result, &self.config.alert_channels)
                .await;

            let delivered = outcomes
                .values()
                .any(|o| o.status == ChannelStatus::Success);
            if delivered {
                self.detector.mark_alert_sent(result);
                dispatched += 1;
            } else if outcomes.values().any(|o| o.status == ChannelStatus::Failed) {
                undeliverable += 1;
                warn!(
                    metric_name = %result.metric_name,
                    severity = %result.severity,
                    "Anomaly alert failed on every channel"
                );
            }
        }

        if let Some(health) = &self.health {
            health.beat(components::DETECTOR);
            health.beat(components::METRIC_STORE);
            if undeliverable > 0 {
                health.fault(
                    components::ALERTER,
                    format!("{undeliverable} alerts failed on every channel"),
                );
            } else if dispatched > 0 {
                health.beat(components::ALERTER);
            }
        }

        (flagged, dispatched)
    }
}
