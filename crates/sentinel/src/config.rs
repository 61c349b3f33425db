//! Service configuration

use anyhow::Result;
use serde::Deserialize;

/// Cost sentinel service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// Service name tag carried in structured logs
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Anomaly scan interval in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Per-channel alert delivery timeout in seconds
    #[serde(default = "default_delivery_timeout")]
    pub alert_timeout_secs: u64,

    /// Duplicate-alert suppression window in seconds
    #[serde(default = "default_dedup_window")]
    pub alert_dedup_window_secs: u64,

    /// Team-chat webhook URL; channel "chat" is registered when set
    #[serde(default)]
    pub chat_webhook_url: Option<String>,

    /// Messaging-bot API base URL
    #[serde(default = "default_bot_api_base")]
    pub bot_api_base: String,

    /// Messaging-bot token; channel "bot" is registered when set
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Messaging-bot target chat id
    #[serde(default)]
    pub bot_chat_id: Option<String>,

    /// Plain JSON webhook URL; channel "webhook" is registered when set
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_service_name() -> String {
    "cost-sentinel".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_scan_interval() -> u64 {
    30
}

fn default_delivery_timeout() -> u64 {
    30
}

fn default_dedup_window() -> u64 {
    300
}

fn default_bot_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            scan_interval_secs: default_scan_interval(),
            alert_timeout_secs: default_delivery_timeout(),
            alert_dedup_window_secs: default_dedup_window(),
            chat_webhook_url: None,
            bot_api_base: default_bot_api_base(),
            bot_token: None,
            bot_chat_id: None,
            webhook_url: None,
        }
    }
}

impl SentinelConfig {
    /// Load configuration from SENTINEL_* environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SENTINEL"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SentinelConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.scan_interval_secs, 30);
        assert_eq!(config.alert_timeout_secs, 30);
        assert!(config.chat_webhook_url.is_none());
    }
}
