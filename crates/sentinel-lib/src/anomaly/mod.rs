//! Anomaly detection over rolling metric windows
//!
//! Four independent statistical models plus a composite detector:
//! - Statistical: z-score over a fixed-capacity ring buffer
//! - Trend: deviation from an hourly-bucketed baseline
//! - Seasonal: deviation from per-period-offset historical averages
//! - Fatigue: exponentially decayed pattern-usage scoring

mod detector;
mod fatigue;
mod seasonal;
mod statistical;
mod trend;

pub use detector::{AnomalyDetector, DetectorConfig};
pub use fatigue::FatigueModel;
pub use seasonal::SeasonalModel;
pub use statistical::StatisticalModel;
pub use trend::TrendModel;

/// Observable lifecycle of a model's history
///
/// A model starts `Idle`, accumulates until it has enough history to
/// evaluate, then stays `Active`. The flagging condition is transient per
/// evaluation: a detection call returning `Some(..)` is the flag, and the
/// next call evaluates fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// No data observed yet
    Idle,
    /// Below the minimum sample count for evaluation
    Accumulating,
    /// Sufficient history; evaluations are meaningful
    Active,
}
