//! Component health tracking
//!
//! Each subsystem beats the registry when it completes work and reports
//! faults when it cannot. Status is derived at read time from the last
//! heartbeat age and any standing fault, so a stalled scan loop shows up
//! as degraded without anyone explicitly marking it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Subsystem names used with the registry
pub mod components {
    pub const COST_TRACKER: &str = "cost_tracker";
    pub const METRIC_STORE: &str = "metric_store";
    pub const DETECTOR: &str = "detector";
    pub const ALERTER: &str = "alerter";
}

/// Derived status of one subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Heartbeat is stale but no fault was reported
    Stale,
    /// A fault is standing
    Failing,
}

/// Point-in-time view of one subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    /// Seconds since the last heartbeat
    pub heartbeat_age_secs: u64,
}

/// Aggregate view served by the liveness and readiness probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub ready: bool,
    pub components: HashMap<String, ComponentReport>,
}

struct ComponentRecord {
    last_beat: Instant,
    fault: Option<String>,
}

/// Registry the engine subsystems report into
pub struct HealthRegistry {
    records: RwLock<HashMap<String, ComponentRecord>>,
    ready: RwLock<bool>,
    /// Heartbeat age past this is reported as stale
    stale_after: Duration,
}

impl HealthRegistry {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ready: RwLock::new(false),
            stale_after,
        }
    }

    /// Record that a subsystem completed a unit of work, clearing any fault
    pub fn beat(&self, component: &str) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(
            component.to_string(),
            ComponentRecord {
                last_beat: Instant::now(),
                fault: None,
            },
        );
    }

    /// Record a standing fault for a subsystem
    pub fn fault(&self, component: &str, message: impl Into<String>) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records.entry(component.to_string()).or_insert(ComponentRecord {
            last_beat: Instant::now(),
            fault: None,
        });
        record.fault = Some(message.into());
    }

    /// Flip readiness once startup wiring is complete
    pub fn set_ready(&self, ready: bool) {
        *self.ready.write().unwrap_or_else(|e| e.into_inner()) = ready;
    }

    /// Derive the current snapshot
    pub fn snapshot(&self) -> HealthSnapshot {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let mut components = HashMap::new();
        let mut any_failing = false;
        for (name, record) in records.iter() {
            let age = now.duration_since(record.last_beat);
            let status = if record.fault.is_some() {
                any_failing = true;
                ComponentStatus::Failing
            } else if age > self.stale_after {
                ComponentStatus::Stale
            } else {
                ComponentStatus::Healthy
            };
            components.insert(
                name.clone(),
                ComponentReport {
                    status,
                    fault: record.fault.clone(),
                    heartbeat_age_secs: age.as_secs(),
                },
            );
        }

        let ready = *self.ready.read().unwrap_or_else(|e| e.into_inner());
        HealthSnapshot {
            healthy: !any_failing,
            ready: ready && !any_failing,
            components,
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}
