//! Alert channel manager
//!
//! Fans one anomaly out to every requested channel in parallel, with a
//! per-channel delivery timeout, bounded retry with exponential backoff,
//! and a dedup window so a flapping detector cannot flood a channel. One
//! failing channel never blocks the others; the result map always carries
//! an entry for every requested channel.

use super::transport::ChannelTransport;
use crate::error::ChannelError;
use crate::models::{AlertChannelResult, AnomalyResult, AnomalyType, Severity};
use crate::observability::{EngineMetrics, StructuredLogger};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Delivery policy shared by all channels
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Hard ceiling for one channel dispatch, retries included
    pub delivery_timeout: Duration,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Identical alerts inside this window are skipped
    pub dedup_window: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            dedup_window: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    metric_name: String,
    anomaly_type: AnomalyType,
    severity: Severity,
}

impl DedupKey {
    fn from_alert(alert: &AnomalyResult) -> Self {
        Self {
            metric_name: alert.metric_name.clone(),
            anomaly_type: alert.anomaly_type,
            severity: alert.severity,
        }
    }
}

/// Parallel dispatcher over the configured channel transports
pub struct AlertManager {
    transports: HashMap<String, Arc<dyn ChannelTransport>>,
    settings: ChannelSettings,
    recent: RwLock<HashMap<DedupKey, Instant>>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl AlertManager {
    pub fn new(settings: ChannelSettings) -> Self {
        Self {
            transports: HashMap::new(),
            settings,
            recent: RwLock::new(HashMap::new()),
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("alert-manager"),
        }
    }

    /// Register a transport under its channel name
    pub fn register(&mut self, transport: Arc<dyn ChannelTransport>) {
        self.transports.insert(transport.name().to_string(), transport);
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transports.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch one alert to the requested channels
    ///
    /// Returns one entry per requested channel. Duplicate alerts within the
    /// dedup window and unconfigured channels come back as skipped; they
    /// never error the dispatch.
    pub async fn send_alert(
        &self,
        alert: &AnomalyResult,
        channels: &[String],
    ) -> HashMap<String, AlertChannelResult> {
        let mut results = HashMap::new();

        if self.is_duplicate(alert) {
            for channel in channels {
                results.insert(
                    channel.clone(),
                    AlertChannelResult::skipped(channel.clone(), "deduplicated"),
                );
            }
            self.record_results(&results);
            return results;
        }

        let mut handles = Vec::new();
        for channel in channels {
            match self.transports.get(channel) {
                Some(transport) => {
                    let transport = Arc::clone(transport);
                    let settings = self.settings.clone();
                    let alert = alert.clone();
                    handles.push((
                        channel.clone(),
                        tokio::spawn(async move {
                            dispatch_one(transport, &alert, &settings).await
                        }),
                    ));
                }
                None => {
                    results.insert(
                        channel.clone(),
                        AlertChannelResult::skipped(channel.clone(), "channel not configured"),
                    );
                }
            }
        }

        for (channel, handle) in handles {
            match handle.await {
                Ok(result) => {
                    results.insert(channel, result);
                }
                Err(e) => {
                    // A panicking transport shows up as a failed channel
                    // rather than poisoning the whole dispatch.
                    let reason = format!("dispatch task failed: {e}");
                    results.insert(
                        channel.clone(),
                        AlertChannelResult::failed(channel, reason, 0),
                    );
                }
            }
        }

        self.record_results(&results);
        results
    }

    /// True when an identical alert was dispatched inside the dedup window
    ///
    /// Check and insert happen under one write lock so two concurrent
    /// identical alerts cannot both pass as first.
    fn is_duplicate(&self, alert: &AnomalyResult) -> bool {
        let key = DedupKey::from_alert(alert);
        let now = Instant::now();
        let window = self.settings.dedup_window;

        let mut recent = self.recent.write().unwrap_or_else(|e| e.into_inner());
        if let Some(sent_at) = recent.get(&key) {
            if now.duration_since(*sent_at) < window {
                return true;
            }
        }
        recent.retain(|_, sent_at| now.duration_since(*sent_at) < window);
        recent.insert(key, now);
        false
    }

    fn record_results(&self, results: &HashMap<String, AlertChannelResult>) {
        for result in results.values() {
            self.metrics
                .inc_alert_result(&result.channel, &result.status.to_string());
            self.logger.log_alert_dispatch(
                &result.channel,
                &result.status.to_string(),
                result.reason.as_deref(),
                result.latency_ms,
            );
        }
    }
}

/// One channel dispatch: retry loop wrapped in the delivery timeout
async fn dispatch_one(
    transport: Arc<dyn ChannelTransport>,
    alert: &AnomalyResult,
    settings: &ChannelSettings,
) -> AlertChannelResult {
    let channel = transport.name().to_string();
    let started = Instant::now();

    let attempt = deliver_with_retries(transport.as_ref(), alert, settings);
    match tokio::time::timeout(settings.delivery_timeout, attempt).await {
        Ok(Ok(())) => {
            AlertChannelResult::success(channel, started.elapsed().as_millis() as u64)
        }
        Ok(Err(e)) => AlertChannelResult::failed(
            channel,
            e.to_string(),
            started.elapsed().as_millis() as u64,
        ),
        Err(_) => {
            let timeout = ChannelError::Timeout(settings.delivery_timeout.as_millis() as u64);
            AlertChannelResult::failed(
                channel,
                timeout.to_string(),
                started.elapsed().as_millis() as u64,
            )
        }
    }
}

async fn deliver_with_retries(
    transport: &dyn ChannelTransport,
    alert: &AnomalyResult,
    settings: &ChannelSettings,
) -> Result<(), ChannelError> {
    let mut backoff = settings.initial_backoff;
    let mut last_error = None;

    for attempt in 0..=settings.max_retries {
        match transport.deliver(alert).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_error = Some(e);
                if attempt < settings.max_retries {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(settings.max_backoff);
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ChannelError::Delivery("no attempt made".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnomalyType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockTransport {
        name: String,
        fail_first: u32,
        delay: Duration,
        attempts: AtomicU32,
    }

    impl MockTransport {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail_first: 0,
                delay: Duration::ZERO,
                attempts: AtomicU32::new(0),
            }
        }

        fn failing_first(name: &str, failures: u32) -> Self {
            Self {
                fail_first: failures,
                ..Self::new(name)
            }
        }

        fn slow(name: &str, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(name)
            }
        }
    }

    #[async_trait]
    impl ChannelTransport for MockTransport {
        fn name(&self) -> &str {
            &self.name
        }

        async fn deliver(&self, _alert: &AnomalyResult) -> Result<(), ChannelError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if attempt < self.fail_first {
                return Err(ChannelError::Delivery("transient failure".to_string()));
            }
            Ok(())
        }
    }

    fn fast_settings() -> ChannelSettings {
        ChannelSettings {
            delivery_timeout: Duration::from_millis(200),
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            dedup_window: Duration::from_secs(300),
        }
    }

    fn sample_alert(metric: &str) -> AnomalyResult {
        AnomalyResult {
            metric_name: metric.to_string(),
            anomaly_type: AnomalyType::CostThreshold,
            severity: Severity::Critical,
            current_value: 0.09,
            baseline_value: Some(0.02),
            confidence: 1.0,
            message: "cost above baseline".to_string(),
            detected_at: 1_700_000_000,
            alert_sent: false,
        }
    }

    #[tokio::test]
    async fn test_send_to_all_channels() {
        let mut manager = AlertManager::new(fast_settings());
        manager.register(Arc::new(MockTransport::new("chat")));
        manager.register(Arc::new(MockTransport::new("webhook")));

        let results = manager
            .send_alert(&sample_alert("m1"), &["chat".to_string(), "webhook".to_string()])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["chat"].status, crate::models::ChannelStatus::Success);
        assert_eq!(results["webhook"].status, crate::models::ChannelStatus::Success);
    }

    #[tokio::test]
    async fn test_unconfigured_channel_skipped() {
        let mut manager = AlertManager::new(fast_settings());
        manager.register(Arc::new(MockTransport::new("chat")));

        let results = manager
            .send_alert(&sample_alert("m2"), &["chat".to_string(), "pager".to_string()])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["chat"].status, crate::models::ChannelStatus::Success);
        assert_eq!(results["pager"].status, crate::models::ChannelStatus::Skipped);
        assert_eq!(
            results["pager"].reason.as_deref(),
            Some("channel not configured")
        );
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failures() {
        let mut manager = AlertManager::new(fast_settings());
        let transport = Arc::new(MockTransport::failing_first("chat", 2));
        manager.register(transport.clone());

        let results = manager
            .send_alert(&sample_alert("m3"), &["chat".to_string()])
            .await;

        assert_eq!(results["chat"].status, crate::models::ChannelStatus::Success);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_reported_failed() {
        let mut manager = AlertManager::new(fast_settings());
        manager.register(Arc::new(MockTransport::failing_first("chat", 10)));

        let results = manager
            .send_alert(&sample_alert("m4"), &["chat".to_string()])
            .await;

        assert_eq!(results["chat"].status, crate::models::ChannelStatus::Failed);
        assert!(results["chat"].reason.is_some());
    }

    #[tokio::test]
    async fn test_slow_channel_times_out() {
        let mut manager = AlertManager::new(ChannelSettings {
            delivery_timeout: Duration::from_millis(20),
            ..fast_settings()
        });
        manager.register(Arc::new(MockTransport::slow("chat", Duration::from_millis(200))));

        let results = manager
            .send_alert(&sample_alert("m5"), &["chat".to_string()])
            .await;

        assert_eq!(results["chat"].status, crate::models::ChannelStatus::Failed);
    }

    #[tokio::test]
    async fn test_slow_channel_does_not_block_fast_one() {
        let mut manager = AlertManager::new(fast_settings());
        manager.register(Arc::new(MockTransport::slow("slow", Duration::from_millis(100))));
        manager.register(Arc::new(MockTransport::new("fast")));

        let started = Instant::now();
        let results = manager
            .send_alert(&sample_alert("m6"), &["slow".to_string(), "fast".to_string()])
            .await;

        // Parallel dispatch: total time tracks the slowest channel, not the sum
        assert!(started.elapsed() < Duration::from_millis(190));
        assert_eq!(results["slow"].status, crate::models::ChannelStatus::Success);
        assert_eq!(results["fast"].status, crate::models::ChannelStatus::Success);
    }

    #[tokio::test]
    async fn test_one_hung_channel_among_four() {
        let mut manager = AlertManager::new(ChannelSettings {
            delivery_timeout: Duration::from_millis(30),
            ..fast_settings()
        });
        manager.register(Arc::new(MockTransport::new("a")));
        manager.register(Arc::new(MockTransport::new("b")));
        manager.register(Arc::new(MockTransport::new("c")));
        manager.register(Arc::new(MockTransport::slow("hung", Duration::from_secs(5))));

        let channels: Vec<String> = ["a", "b", "c", "hung"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let started = Instant::now();
        let results = manager.send_alert(&sample_alert("m-sla"), &channels).await;

        // Bounded by the per-channel timeout, not the hung transport
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(results.len(), 4);
        let successes = results
            .values()
            .filter(|r| r.status == crate::models::ChannelStatus::Success)
            .count();
        assert_eq!(successes, 3);
        assert_eq!(results["hung"].status, crate::models::ChannelStatus::Failed);
        assert!(results["hung"].reason.as_deref().unwrap().contains("timeout"));
    }

    struct PanickingTransport;

    #[async_trait]
    impl ChannelTransport for PanickingTransport {
        fn name(&self) -> &str {
            "broken"
        }

        async fn deliver(&self, _alert: &AnomalyResult) -> Result<(), ChannelError> {
            panic!("transport bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_transport_reported_under_its_channel() {
        let mut manager = AlertManager::new(fast_settings());
        manager.register(Arc::new(PanickingTransport));
        manager.register(Arc::new(MockTransport::new("chat")));

        let results = manager
            .send_alert(
                &sample_alert("m-panic"),
                &["broken".to_string(), "chat".to_string()],
            )
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["chat"].status, crate::models::ChannelStatus::Success);
        assert_eq!(results["broken"].status, crate::models::ChannelStatus::Failed);
        assert_eq!(results["broken"].channel, "broken");
    }

    #[tokio::test]
    async fn test_concurrent_identical_alerts_dispatch_once() {
        let mut manager = AlertManager::new(fast_settings());
        let transport = Arc::new(MockTransport::new("chat"));
        manager.register(transport.clone());
        let manager = Arc::new(manager);

        let alert = sample_alert("m-race");
        let channels = vec!["chat".to_string()];
        let (first, second) = tokio::join!(
            manager.send_alert(&alert, &channels),
            manager.send_alert(&alert, &channels)
        );

        let statuses = [first["chat"].status, second["chat"].status];
        assert!(statuses.contains(&crate::models::ChannelStatus::Success));
        assert!(statuses.contains(&crate::models::ChannelStatus::Skipped));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_alert_deduplicated() {
        let mut manager = AlertManager::new(fast_settings());
        let transport = Arc::new(MockTransport::new("chat"));
        manager.register(transport.clone());

        let alert = sample_alert("m7");
        let first = manager.send_alert(&alert, &["chat".to_string()]).await;
        assert_eq!(first["chat"].status, crate::models::ChannelStatus::Success);

        let second = manager.send_alert(&alert, &["chat".to_string()]).await;
        assert_eq!(second["chat"].status, crate::models::ChannelStatus::Skipped);
        assert_eq!(second["chat"].reason.as_deref(), Some("deduplicated"));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_metrics_not_deduplicated() {
        let mut manager = AlertManager::new(fast_settings());
        let transport = Arc::new(MockTransport::new("chat"));
        manager.register(transport.clone());

        manager.send_alert(&sample_alert("m8"), &["chat".to_string()]).await;
        manager.send_alert(&sample_alert("m9"), &["chat".to_string()]).await;

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    }
}
