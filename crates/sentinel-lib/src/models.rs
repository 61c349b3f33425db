//! Core data models for the cost sentinel engine

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource classes that incur attributable cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Llm,
    Infra,
    Vector,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Llm => write!(f, "llm"),
            ResourceType::Infra => write!(f, "infra"),
            ResourceType::Vector => write!(f, "vector"),
        }
    }
}

/// Token counts for a single LLM call, independent of any provider SDK shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// Per-resource-type event detail, matched exhaustively by consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource_type", rename_all = "lowercase")]
pub enum CostMetadata {
    Llm {
        model: String,
        usage: TokenUsage,
    },
    Infra {
        service: String,
        cpu_cores: f64,
        memory_gb: f64,
        duration_minutes: f64,
    },
    Vector {
        query_count: u64,
        collection: String,
    },
}

impl CostMetadata {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            CostMetadata::Llm { .. } => ResourceType::Llm,
            CostMetadata::Infra { .. } => ResourceType::Infra,
            CostMetadata::Vector { .. } => ResourceType::Vector,
        }
    }
}

/// Immutable record of one priced operation, attributed to a work unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEvent {
    pub persona_id: String,
    pub work_id: String,
    pub operation: String,
    pub amount_usd: f64,
    #[serde(flatten)]
    pub metadata: CostMetadata,
    /// Unix seconds
    pub created_at: i64,
}

/// Running cost sums for one work unit, broken down by resource type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkCostSummary {
    pub work_id: String,
    pub llm_usd: f64,
    pub infra_usd: f64,
    pub vector_usd: f64,
    pub total_usd: f64,
    pub event_count: u64,
}

/// One ephemeral observation fed into the rolling metric store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_name: String,
    pub value: f64,
    /// Unix seconds
    pub timestamp: i64,
    pub labels: HashMap<String, String>,
}

/// Classification of a detected anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Statistical,
    Trend,
    Seasonal,
    Fatigue,
    CostThreshold,
    EngagementDrop,
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyType::Statistical => write!(f, "statistical"),
            AnomalyType::Trend => write!(f, "trend"),
            AnomalyType::Seasonal => write!(f, "seasonal"),
            AnomalyType::Fatigue => write!(f, "fatigue"),
            AnomalyType::CostThreshold => write!(f, "cost_threshold"),
            AnomalyType::EngagementDrop => write!(f, "engagement_drop"),
        }
    }
}

/// Ordinal anomaly severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Outcome of one detector evaluation that breached a threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub metric_name: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub current_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_value: Option<f64>,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    pub message: String,
    /// Unix seconds
    pub detected_at: i64,
    /// Flipped to true only after channel dispatch completes
    pub alert_sent: bool,
}

/// Delivery status for one alert channel attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Success => write!(f, "success"),
            ChannelStatus::Failed => write!(f, "failed"),
            ChannelStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Record of one dispatch attempt to one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertChannelResult {
    pub channel: String,
    pub status: ChannelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub latency_ms: u64,
}

impl AlertChannelResult {
    pub fn success(channel: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            channel: channel.into(),
            status: ChannelStatus::Success,
            reason: None,
            latency_ms,
        }
    }

    pub fn failed(channel: impl Into<String>, reason: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            channel: channel.into(),
            status: ChannelStatus::Failed,
            reason: Some(reason.into()),
            latency_ms,
        }
    }

    pub fn skipped(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            status: ChannelStatus::Skipped,
            reason: Some(reason.into()),
            latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_resource_type() {
        let meta = CostMetadata::Llm {
            model: "gpt-4o".to_string(),
            usage: TokenUsage::new(1000, 150),
        };
        assert_eq!(meta.resource_type(), ResourceType::Llm);

        let meta = CostMetadata::Vector {
            query_count: 3,
            collection: "personas".to_string(),
        };
        assert_eq!(meta.resource_type(), ResourceType::Vector);
    }

    #[test]
    fn test_cost_event_serialization_tags_resource_type() {
        let event = CostEvent {
            persona_id: "p-1".to_string(),
            work_id: "post-1".to_string(),
            operation: "generate_caption".to_string(),
            amount_usd: 0.004,
            metadata: CostMetadata::Llm {
                model: "gpt-4o".to_string(),
                usage: TokenUsage::new(1000, 150),
            },
            created_at: 1_700_000_000,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["resource_type"], "llm");
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["usage"]["input_tokens"], 1000);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(
            serde_json::to_string(&AnomalyType::EngagementDrop).unwrap(),
            "\"engagement_drop\""
        );
    }

    #[test]
    fn test_channel_result_constructors() {
        let ok = AlertChannelResult::success("slack", 42);
        assert_eq!(ok.status, ChannelStatus::Success);
        assert!(ok.reason.is_none());

        let skipped = AlertChannelResult::skipped("telegram", "channel not configured");
        assert_eq!(skipped.status, ChannelStatus::Skipped);
        assert_eq!(skipped.latency_ms, 0);
    }
}
