//! Error taxonomy for cost tracking and alert delivery
//!
//! Cost-tracking errors are local by contract: callers log and swallow them
//! so a malformed tracking call never breaks content generation. Channel
//! errors are captured per channel and surfaced in the aggregate result map.

use thiserror::Error;

/// Errors raised while recording a cost event
#[derive(Debug, Error)]
pub enum CostError {
    /// Computed or supplied amount is negative or not a finite number.
    /// The event is dropped, never clamped.
    #[error("invalid cost amount: {0}")]
    InvalidAmount(String),

    /// No rate is configured for the requested model or resource.
    /// A zero-cost event is never silently recorded in its place.
    #[error("no pricing configured for {resource} '{key}'")]
    UnknownPricing { resource: &'static str, key: String },

    /// A required attribution field was empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Errors raised while delivering to a single alert channel
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Transport-level delivery failure (connection, non-2xx response)
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The per-channel hard timeout elapsed
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Channel requested but no credentials/webhook configured
    #[error("channel not configured: {0}")]
    NotConfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_error_display() {
        let err = CostError::UnknownPricing {
            resource: "llm model",
            key: "gpt-99".to_string(),
        };
        assert_eq!(err.to_string(), "no pricing configured for llm model 'gpt-99'");

        let err = CostError::InvalidAmount("amount is NaN".to_string());
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn test_channel_error_display() {
        assert_eq!(
            ChannelError::Timeout(30_000).to_string(),
            "timeout after 30000ms"
        );
        assert!(ChannelError::NotConfigured("slack".to_string())
            .to_string()
            .contains("slack"));
    }
}
