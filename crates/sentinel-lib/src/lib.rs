//! Core library for real-time cost attribution and anomaly alerting
//!
//! This crate provides the core functionality for:
//! - Per-resource cost tracking with pricing resolution
//! - Rolling per-scope metric windows
//! - Statistical, trend, seasonal, and fatigue anomaly models
//! - Parallel multi-channel alert dispatch
//! - Health checks and observability

pub mod alert;
pub mod anomaly;
pub mod cost;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pricing;
pub mod scan;
pub mod store;

pub use alert::{AlertManager, ChannelSettings, ChannelTransport};
pub use anomaly::{AnomalyDetector, DetectorConfig};
pub use cost::{CostTracker, TrackerConfig};
pub use error::{ChannelError, CostError};
pub use health::{ComponentStatus, HealthRegistry, HealthSnapshot};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use pricing::{PricingConfig, PricingResolver};
pub use scan::{ScanConfig, ScanLoop};
pub use store::{MetricKey, MetricStore, StoreConfig, WindowSnapshot};
