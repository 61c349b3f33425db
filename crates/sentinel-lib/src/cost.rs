//! Cost collection and attribution
//!
//! The tracking fast path: price the operation, append an immutable
//! `CostEvent`, bump the per-work-unit running totals, and emit a metric
//! sample into the rolling store. No network or detector work happens here;
//! scanning and alerting run decoupled so producer latency is unaffected.

use crate::error::CostError;
use crate::health::{components, HealthRegistry};
use crate::models::{CostEvent, CostMetadata, MetricSample, TokenUsage, WorkCostSummary};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::pricing::PricingResolver;
use crate::store::{MetricStore, SCOPE_LABEL};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Metric fed by every accepted event, scoped per persona
pub const COST_PER_POST_METRIC: &str = "cost_per_post_usd";

/// Default event retention for the reporting window (24 hours)
const DEFAULT_REPORTING_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default cap on retained events
const DEFAULT_MAX_EVENTS: usize = 100_000;

/// Default write-path latency target (milliseconds)
const DEFAULT_STORAGE_LATENCY_TARGET_MS: u64 = 500;

/// Configuration for the collector
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How long recorded events are retained before pruning
    pub reporting_window: Duration,
    /// Hard cap on the retained event log
    pub max_events: usize,
    /// Write-path latency target; slower writes are logged
    pub storage_latency_target_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reporting_window: DEFAULT_REPORTING_WINDOW,
            max_events: DEFAULT_MAX_EVENTS,
            storage_latency_target_ms: DEFAULT_STORAGE_LATENCY_TARGET_MS,
        }
    }
}

/// Running sums for one work unit
#[derive(Debug, Clone, Copy, Default)]
struct WorkTotals {
    llm_usd: f64,
    infra_usd: f64,
    vector_usd: f64,
    event_count: u64,
}

impl WorkTotals {
    fn total(&self) -> f64 {
        self.llm_usd + self.infra_usd + self.vector_usd
    }
}

/// Records cost events and maintains O(1) totals per work unit
pub struct CostTracker {
    pricing: PricingResolver,
    store: Arc<MetricStore>,
    events: RwLock<VecDeque<CostEvent>>,
    totals: DashMap<String, WorkTotals>,
    config: TrackerConfig,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    health: Option<Arc<HealthRegistry>>,
}

impl CostTracker {
    pub fn new(pricing: PricingResolver, store: Arc<MetricStore>, config: TrackerConfig) -> Self {
        Self {
            pricing,
            store,
            events: RwLock::new(VecDeque::new()),
            totals: DashMap::new(),
            config,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("cost-tracker"),
            health: None,
        }
    }

    /// Report heartbeats into the given registry on every recorded event
    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    /// Track an LLM call
    ///
    /// Prices the call from token usage and records the event. Returns the
    /// recorded event so the caller can log or forward it.
    pub fn track_llm_cost(
        &self,
        model: &str,
        usage: TokenUsage,
        persona_id: &str,
        work_id: &str,
        operation: &str,
    ) -> Result<CostEvent, CostError> {
        // Pricing failures drop the event, so they count as rejections too
        let amount = match self.pricing.price_llm(model, usage) {
            Ok(amount) => amount,
            Err(e) => {
                self.metrics.inc_cost_events_rejected();
                self.logger
                    .log_tracking_rejected("llm", work_id, &e.to_string());
                return Err(e);
            }
        };
        self.record(
            persona_id,
            work_id,
            operation,
            amount,
            CostMetadata::Llm {
                model: model.to_string(),
                usage,
            },
        )
    }

    /// Track compute/infrastructure usage
    pub fn track_infra_cost(
        &self,
        service: &str,
        cpu_cores: f64,
        memory_gb: f64,
        duration_minutes: f64,
        persona_id: &str,
        work_id: &str,
        operation: &str,
    ) -> Result<CostEvent, CostError> {
        let amount = self.pricing.price_infra(cpu_cores, memory_gb, duration_minutes);
        self.record(
            persona_id,
            work_id,
            operation,
            amount,
            CostMetadata::Infra {
                service: service.to_string(),
                cpu_cores,
                memory_gb,
                duration_minutes,
            },
        )
    }

    /// Track vector-store queries
    pub fn track_vector_cost(
        &self,
        operation: &str,
        query_count: u64,
        collection: &str,
        persona_id: &str,
        work_id: &str,
    ) -> Result<CostEvent, CostError> {
        let amount = self.pricing.price_vector(query_count, collection);
        self.record(
            persona_id,
            work_id,
            operation,
            amount,
            CostMetadata::Vector {
                query_count,
                collection: collection.to_string(),
            },
        )
    }

    /// O(1) running total for a work unit; 0.0 for unknown ids
    ///
    /// A work item with no tracked cost yet is valid, not an error.
    pub fn total_cost(&self, work_id: &str) -> f64 {
        self.totals.get(work_id).map(|t| t.total()).unwrap_or(0.0)
    }

    /// Per-resource-type breakdown for a work unit
    pub fn work_summary(&self, work_id: &str) -> WorkCostSummary {
        let totals = self
            .totals
            .get(work_id)
            .map(|t| *t.value())
            .unwrap_or_default();

        WorkCostSummary {
            work_id: work_id.to_string(),
            llm_usd: totals.llm_usd,
            infra_usd: totals.infra_usd,
            vector_usd: totals.vector_usd,
            total_usd: totals.total(),
            event_count: totals.event_count,
        }
    }

    /// Events recorded for one work unit, in attribution order
    pub fn events_for_work(&self, work_id: &str) -> Vec<CostEvent> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        events
            .iter()
            .filter(|e| e.work_id == work_id)
            .cloned()
            .collect()
    }

    /// Number of events currently retained
    pub fn event_count(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of work units with attributed cost
    pub fn work_unit_count(&self) -> usize {
        self.totals.len()
    }

    fn record(
        &self,
        persona_id: &str,
        work_id: &str,
        operation: &str,
        amount_usd: f64,
        metadata: CostMetadata,
    ) -> Result<CostEvent, CostError> {
        let started = Instant::now();
        let resource_type = metadata.resource_type();

        if let Err(e) = self.validate(persona_id, work_id, amount_usd) {
            self.metrics.inc_cost_events_rejected();
            self.logger
                .log_tracking_rejected(&resource_type.to_string(), work_id, &e.to_string());
            return Err(e);
        }

        let event = CostEvent {
            persona_id: persona_id.to_string(),
            work_id: work_id.to_string(),
            operation: operation.to_string(),
            amount_usd,
            metadata,
            created_at: chrono::Utc::now().timestamp(),
        };

        // Totals first: `total_cost` readers may briefly see a total ahead of
        // the event log, never behind it.
        {
            let mut totals = self.totals.entry(work_id.to_string()).or_default();
            match resource_type {
                crate::models::ResourceType::Llm => totals.llm_usd += amount_usd,
                crate::models::ResourceType::Infra => totals.infra_usd += amount_usd,
                crate::models::ResourceType::Vector => totals.vector_usd += amount_usd,
            }
            totals.event_count += 1;
        }

        {
            let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
            let cutoff =
                event.created_at - self.config.reporting_window.as_secs() as i64;
            while let Some(front) = events.front() {
                if front.created_at < cutoff {
                    events.pop_front();
                } else {
                    break;
                }
            }
            while events.len() >= self.config.max_events {
                events.pop_front();
            }
            events.push_back(event.clone());
        }

        self.emit_samples(&event, resource_type);

        self.metrics.inc_cost_events(&resource_type.to_string());
        self.metrics
            .set_work_units_tracked(self.totals.len() as i64);
        let elapsed = started.elapsed();
        self.metrics.observe_track_latency(elapsed.as_secs_f64());
        if elapsed.as_millis() as u64 > self.config.storage_latency_target_ms {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                target_ms = self.config.storage_latency_target_ms,
                work_id = %work_id,
                "Cost write path exceeded latency target"
            );
        }
        self.logger.log_cost_event(
            &resource_type.to_string(),
            persona_id,
            work_id,
            operation,
            amount_usd,
        );
        if let Some(health) = &self.health {
            health.beat(components::COST_TRACKER);
        }

        Ok(event)
    }

    fn validate(&self, persona_id: &str, work_id: &str, amount_usd: f64) -> Result<(), CostError> {
        if work_id.is_empty() {
            return Err(CostError::MissingField("work_id"));
        }
        if persona_id.is_empty() {
            return Err(CostError::MissingField("persona_id"));
        }
        if amount_usd.is_nan() {
            return Err(CostError::InvalidAmount("amount is NaN".to_string()));
        }
        if !amount_usd.is_finite() {
            return Err(CostError::InvalidAmount("amount is not finite".to_string()));
        }
        if amount_usd < 0.0 {
            return Err(CostError::InvalidAmount(format!(
                "amount is negative: {amount_usd}"
            )));
        }
        Ok(())
    }

    fn emit_samples(&self, event: &CostEvent, resource_type: crate::models::ResourceType) {
        let mut labels = HashMap::new();
        labels.insert(SCOPE_LABEL.to_string(), event.persona_id.clone());
        labels.insert("work_id".to_string(), event.work_id.clone());

        self.store.record_sample(&MetricSample {
            metric_name: COST_PER_POST_METRIC.to_string(),
            value: event.amount_usd,
            timestamp: event.created_at,
            labels: labels.clone(),
        });
        self.store.record_sample(&MetricSample {
            metric_name: format!("{resource_type}_cost_usd"),
            value: event.amount_usd,
            timestamp: event.created_at,
            labels,
        });
        self.metrics
            .set_metric_store_keys(self.store.key_count() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{ModelRate, PricingConfig};

    fn tracker() -> CostTracker {
        CostTracker::new(
            PricingResolver::default(),
            Arc::new(MetricStore::default()),
            TrackerConfig::default(),
        )
    }

    #[test]
    fn test_llm_tracking_records_computed_amount() {
        let tracker = tracker();

        let event = tracker
            .track_llm_cost("gpt-4o", TokenUsage::new(1000, 150), "p-1", "post-1", "caption")
            .unwrap();

        assert!((event.amount_usd - 0.004).abs() < 1e-9);
        assert!((tracker.total_cost("post-1") - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_end_to_end_attribution_sum() {
        let tracker = tracker();

        let llm = tracker
            .track_llm_cost("gpt-4o", TokenUsage::new(1000, 150), "p-1", "p1", "caption")
            .unwrap();
        let infra = tracker
            .track_infra_cost("render", 0.5, 1.0, 10.0, "p-1", "p1", "render")
            .unwrap();

        let total = tracker.total_cost("p1");
        assert!((total - (llm.amount_usd + infra.amount_usd)).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_work_id_is_zero_not_error() {
        let tracker = tracker();
        assert_eq!(tracker.total_cost("never-seen"), 0.0);
        assert_eq!(tracker.work_summary("never-seen").event_count, 0);
    }

    #[test]
    fn test_missing_ids_rejected() {
        let tracker = tracker();

        let result =
            tracker.track_llm_cost("gpt-4o", TokenUsage::new(10, 10), "p-1", "", "caption");
        assert!(matches!(result, Err(CostError::MissingField("work_id"))));

        let result =
            tracker.track_llm_cost("gpt-4o", TokenUsage::new(10, 10), "", "post-1", "caption");
        assert!(matches!(result, Err(CostError::MissingField("persona_id"))));

        // Nothing was recorded
        assert_eq!(tracker.event_count(), 0);
        assert_eq!(tracker.total_cost("post-1"), 0.0);
    }

    #[test]
    fn test_unknown_model_drops_event() {
        let tracker = tracker();
        let rejected_before = tracker.metrics.cost_events_rejected_count();

        let result =
            tracker.track_llm_cost("gpt-99", TokenUsage::new(10, 10), "p-1", "post-1", "caption");
        assert!(matches!(result, Err(CostError::UnknownPricing { .. })));
        assert_eq!(tracker.total_cost("post-1"), 0.0);
        // Dropped pricing failures are counted like any other rejection.
        // The counter is global, so other tests may also advance it.
        assert!(tracker.metrics.cost_events_rejected_count() > rejected_before);
    }

    #[test]
    fn test_negative_rate_rejected_not_clamped() {
        let config = PricingConfig {
            default_llm_rate: Some(ModelRate::new(-1.0, -1.0)),
            ..Default::default()
        };
        let tracker = CostTracker::new(
            PricingResolver::new(config),
            Arc::new(MetricStore::default()),
            TrackerConfig::default(),
        );

        let result =
            tracker.track_llm_cost("anything", TokenUsage::new(10, 10), "p-1", "post-1", "op");
        assert!(matches!(result, Err(CostError::InvalidAmount(_))));
        assert_eq!(tracker.event_count(), 0);
    }

    #[test]
    fn test_summary_breakdown_matches_invariant() {
        let tracker = tracker();

        tracker
            .track_llm_cost("gpt-4o", TokenUsage::new(500, 100), "p-1", "w", "caption")
            .unwrap();
        tracker
            .track_vector_cost("context_lookup", 20, "personas", "p-1", "w")
            .unwrap();
        tracker
            .track_infra_cost("render", 1.0, 2.0, 5.0, "p-1", "w", "render")
            .unwrap();

        let summary = tracker.work_summary("w");
        assert_eq!(summary.event_count, 3);
        assert!(
            (summary.total_usd - (summary.llm_usd + summary.infra_usd + summary.vector_usd)).abs()
                < 1e-9
        );
        assert!((summary.total_usd - tracker.total_cost("w")).abs() < 1e-9);
    }

    #[test]
    fn test_events_attributed_in_call_order() {
        let tracker = tracker();

        for i in 0..5 {
            tracker
                .track_vector_cost(&format!("op-{i}"), 1, "personas", "p-1", "w")
                .unwrap();
        }

        let events = tracker.events_for_work("w");
        let ops: Vec<&str> = events.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(ops, vec!["op-0", "op-1", "op-2", "op-3", "op-4"]);
    }

    #[test]
    fn test_accepted_event_feeds_rolling_store() {
        let store = Arc::new(MetricStore::default());
        let tracker = CostTracker::new(
            PricingResolver::default(),
            store.clone(),
            TrackerConfig::default(),
        );

        tracker
            .track_llm_cost("gpt-4o", TokenUsage::new(1000, 150), "persona-7", "w", "caption")
            .unwrap();

        let snap = store.snapshot(COST_PER_POST_METRIC, "persona-7").unwrap();
        assert_eq!(snap.len(), 1);
        assert!((snap.latest().unwrap().1 - 0.004).abs() < 1e-9);
        assert!(store.snapshot("llm_cost_usd", "persona-7").is_some());
    }

    #[test]
    fn test_event_log_capacity_cap() {
        let tracker = CostTracker::new(
            PricingResolver::default(),
            Arc::new(MetricStore::default()),
            TrackerConfig {
                reporting_window: Duration::from_secs(3600),
                max_events: 10,
                ..Default::default()
            },
        );

        for i in 0..25 {
            tracker
                .track_vector_cost("lookup", 1, "personas", "p-1", &format!("w-{i}"))
                .unwrap();
        }

        assert_eq!(tracker.event_count(), 10);
        // Totals are unaffected by event-log pruning
        assert!(tracker.total_cost("w-0") > 0.0);
    }

    #[test]
    fn test_recorded_event_beats_health_registry() {
        use crate::health::ComponentStatus;

        let health = Arc::new(HealthRegistry::default());
        let tracker = CostTracker::new(
            PricingResolver::default(),
            Arc::new(MetricStore::default()),
            TrackerConfig::default(),
        )
        .with_health(health.clone());

        assert!(!health.snapshot().components.contains_key(components::COST_TRACKER));

        tracker
            .track_vector_cost("lookup", 1, "personas", "p-1", "w")
            .unwrap();

        let snapshot = health.snapshot();
        assert_eq!(
            snapshot.components[components::COST_TRACKER].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_concurrent_tracking_sums_correctly() {
        let tracker = Arc::new(tracker());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    tracker
                        .track_vector_cost("lookup", 10, "personas", "p-1", "shared")
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // 4 tasks * 50 calls * 10 queries * 0.0001 USD
        assert!((tracker.total_cost("shared") - 0.2).abs() < 1e-9);
        assert_eq!(tracker.work_summary("shared").event_count, 200);
    }
}
