//! Rolling metric store shared by the cost collector and the detector
//!
//! Bounded per-key windows of recent samples. Keys are (metric, scope) pairs
//! so unrelated personas and metrics never contend on the same lock; the
//! collector appends on the write path and detectors read cloned snapshots.

use crate::models::MetricSample;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

/// Default per-key window capacity
const DEFAULT_WINDOW_CAPACITY: usize = 200;

/// Default sample retention (24 hours)
const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Label key carrying the scope of a sample (persona, pattern, ...)
pub const SCOPE_LABEL: &str = "scope";

/// Identifies one rolling window
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub metric: String,
    pub scope: String,
}

impl MetricKey {
    pub fn new(metric: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            scope: scope.into(),
        }
    }
}

/// Configuration for the rolling store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum samples retained per key
    pub window_capacity: usize,
    /// Maximum sample age before expiry
    pub retention: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Bounded FIFO window of timestamped values for one key
#[derive(Debug, Clone)]
struct MetricWindow {
    samples: VecDeque<(i64, f64)>,
    capacity: usize,
    retention_secs: i64,
}

impl MetricWindow {
    fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            retention_secs: retention.as_secs() as i64,
        }
    }

    fn push(&mut self, timestamp: i64, value: f64) {
        let cutoff = timestamp - self.retention_secs;
        while let Some((ts, _)) = self.samples.front() {
            if *ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp, value));
    }
}

/// Consistent point-in-time view of one window
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub key: MetricKey,
    pub points: Vec<(i64, f64)>,
}

impl WindowSnapshot {
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    pub fn latest(&self) -> Option<(i64, f64)> {
        self.points.last().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Concurrent rolling metric store
///
/// Synchronization is per key via the map's shard locks; there is no global
/// lock serializing unrelated keys.
pub struct MetricStore {
    windows: DashMap<MetricKey, MetricWindow>,
    config: StoreConfig,
}

impl MetricStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    /// Append a value to the (metric, scope) window
    pub fn record(&self, metric: &str, scope: &str, timestamp: i64, value: f64) {
        let key = MetricKey::new(metric, scope);
        let mut window = self
            .windows
            .entry(key)
            .or_insert_with(|| MetricWindow::new(self.config.window_capacity, self.config.retention));
        window.push(timestamp, value);
    }

    /// Append a `MetricSample`, taking the scope from its labels
    pub fn record_sample(&self, sample: &MetricSample) {
        let scope = sample
            .labels
            .get(SCOPE_LABEL)
            .map(String::as_str)
            .unwrap_or("global");
        self.record(&sample.metric_name, scope, sample.timestamp, sample.value);
    }

    /// Clone a consistent view of one window
    pub fn snapshot(&self, metric: &str, scope: &str) -> Option<WindowSnapshot> {
        let key = MetricKey::new(metric, scope);
        self.windows.get(&key).map(|window| WindowSnapshot {
            key: key.clone(),
            points: window.samples.iter().copied().collect(),
        })
    }

    /// All keys currently holding samples
    pub fn keys(&self) -> Vec<MetricKey> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }

    /// Keys whose scope matches, for scoped anomaly scans
    pub fn keys_for_scope(&self, scope: &str) -> Vec<MetricKey> {
        self.windows
            .iter()
            .filter(|e| e.key().scope == scope)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Number of tracked windows
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_and_snapshot() {
        let store = MetricStore::default();

        for i in 0..5 {
            store.record("cost_per_post_usd", "persona-1", 1000 + i, 0.01 * i as f64);
        }

        let snap = store.snapshot("cost_per_post_usd", "persona-1").unwrap();
        assert_eq!(snap.len(), 5);
        assert_eq!(snap.latest().unwrap().0, 1004);
    }

    #[test]
    fn test_unknown_key_has_no_snapshot() {
        let store = MetricStore::default();
        assert!(store.snapshot("cost_per_post_usd", "nobody").is_none());
    }

    #[test]
    fn test_window_capacity_eviction() {
        let store = MetricStore::new(StoreConfig {
            window_capacity: 3,
            retention: Duration::from_secs(3600),
        });

        for i in 0..10i64 {
            store.record("m", "s", 1000 + i, i as f64);
        }

        let snap = store.snapshot("m", "s").unwrap();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.values(), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_retention_expiry() {
        let store = MetricStore::new(StoreConfig {
            window_capacity: 100,
            retention: Duration::from_secs(60),
        });

        store.record("m", "s", 1000, 1.0);
        store.record("m", "s", 1030, 2.0);
        // 100 seconds later, the first sample is past retention
        store.record("m", "s", 1100, 3.0);

        let snap = store.snapshot("m", "s").unwrap();
        assert_eq!(snap.values(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_keys_for_scope() {
        let store = MetricStore::default();
        store.record("cost_per_post_usd", "persona-1", 1000, 0.01);
        store.record("viral_coefficient", "persona-1", 1000, 1.2);
        store.record("cost_per_post_usd", "persona-2", 1000, 0.02);

        let keys = store.keys_for_scope("persona-1");
        assert_eq!(keys.len(), 2);
        assert_eq!(store.key_count(), 3);
    }

    #[test]
    fn test_record_sample_uses_scope_label() {
        let store = MetricStore::default();
        let mut labels = std::collections::HashMap::new();
        labels.insert(SCOPE_LABEL.to_string(), "persona-9".to_string());

        store.record_sample(&MetricSample {
            metric_name: "cost_per_post_usd".to_string(),
            value: 0.05,
            timestamp: 1000,
            labels,
        });

        assert!(store.snapshot("cost_per_post_usd", "persona-9").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_append_and_read() {
        let store = Arc::new(MetricStore::default());

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..500i64 {
                    store.record("m", "s", 1000 + i, i as f64);
                }
            })
        };

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    if let Some(snap) = store.snapshot("m", "s") {
                        // Snapshots are internally consistent: timestamps ordered
                        let mut last = i64::MIN;
                        for (ts, _) in &snap.points {
                            assert!(*ts >= last);
                            last = *ts;
                        }
                    }
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();

        assert_eq!(store.snapshot("m", "s").unwrap().len(), 200);
    }
}
