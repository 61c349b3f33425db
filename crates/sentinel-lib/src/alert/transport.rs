//! Alert delivery transports
//!
//! Each transport knows how to format an anomaly for one channel type and
//! deliver it over HTTP. Transports are stateless besides their client and
//! endpoint; retries and timeouts live in the manager.

use crate::error::ChannelError;
use crate::models::{AnomalyResult, Severity};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use url::Url;

/// Delivery seam for one alert channel
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Channel identifier used in configuration and result maps
    fn name(&self) -> &str;

    /// Deliver one alert; a returned error is retryable
    async fn deliver(&self, alert: &AnomalyResult) -> Result<(), ChannelError>;
}

fn http_client() -> Result<reqwest::Client, ChannelError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ChannelError::Delivery(format!("client init failed: {e}")))
}

async fn post_json(
    client: &reqwest::Client,
    url: &Url,
    body: &serde_json::Value,
) -> Result<(), ChannelError> {
    let response = client
        .post(url.clone())
        .json(body)
        .send()
        .await
        .map_err(|e| ChannelError::Delivery(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ChannelError::Delivery(format!(
            "endpoint returned {status}: {detail}"
        )));
    }
    Ok(())
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#d62d20",
        Severity::Warning => "#ffa500",
        Severity::Info => "#36a64f",
    }
}

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "\u{1F6A8}",
        Severity::Warning => "\u{26A0}\u{FE0F}",
        Severity::Info => "\u{2139}\u{FE0F}",
    }
}

/// Team-chat webhook (Slack-compatible attachment payload)
pub struct ChatWebhookTransport {
    name: String,
    webhook_url: Url,
    client: reqwest::Client,
}

impl ChatWebhookTransport {
    pub fn new(name: impl Into<String>, webhook_url: &str) -> Result<Self, ChannelError> {
        let webhook_url = Url::parse(webhook_url)
            .map_err(|e| ChannelError::NotConfigured(format!("invalid webhook url: {e}")))?;
        Ok(Self {
            name: name.into(),
            webhook_url,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl ChannelTransport for ChatWebhookTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, alert: &AnomalyResult) -> Result<(), ChannelError> {
        let mut fields = vec![
            json!({"title": "Metric", "value": alert.metric_name, "short": true}),
            json!({"title": "Type", "value": alert.anomaly_type.to_string(), "short": true}),
            json!({"title": "Current", "value": format!("{:.4}", alert.current_value), "short": true}),
        ];
        if let Some(baseline) = alert.baseline_value {
            fields.push(json!({"title": "Baseline", "value": format!("{:.4}", baseline), "short": true}));
        }

        let body = json!({
            "attachments": [{
                "color": severity_color(alert.severity),
                "title": format!("{} anomaly: {}", alert.severity, alert.metric_name),
                "text": alert.message,
                "fields": fields,
                "ts": alert.detected_at,
            }]
        });
        post_json(&self.client, &self.webhook_url, &body).await
    }
}

/// Messaging-bot HTTP API (token plus target chat)
pub struct BotApiTransport {
    name: String,
    endpoint: Url,
    chat_id: String,
    client: reqwest::Client,
}

impl BotApiTransport {
    pub fn new(
        name: impl Into<String>,
        api_base: &str,
        token: &str,
        chat_id: impl Into<String>,
    ) -> Result<Self, ChannelError> {
        if token.is_empty() {
            return Err(ChannelError::NotConfigured("empty bot token".to_string()));
        }
        let endpoint = Url::parse(&format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token))
            .map_err(|e| ChannelError::NotConfigured(format!("invalid bot api url: {e}")))?;
        Ok(Self {
            name: name.into(),
            endpoint,
            chat_id: chat_id.into(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl ChannelTransport for BotApiTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, alert: &AnomalyResult) -> Result<(), ChannelError> {
        let baseline = alert
            .baseline_value
            .map(|b| format!("{b:.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        let text = format!(
            "{} {} anomaly on {}\n{}\ncurrent: {:.4}, baseline: {}",
            severity_emoji(alert.severity),
            alert.severity,
            alert.metric_name,
            alert.message,
            alert.current_value,
            baseline,
        );
        let body = json!({"chat_id": self.chat_id, "text": text});
        post_json(&self.client, &self.endpoint, &body).await
    }
}

/// Plain webhook that receives the anomaly as JSON
pub struct GenericWebhookTransport {
    name: String,
    endpoint: Url,
    client: reqwest::Client,
}

impl GenericWebhookTransport {
    pub fn new(name: impl Into<String>, endpoint: &str) -> Result<Self, ChannelError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ChannelError::NotConfigured(format!("invalid webhook url: {e}")))?;
        Ok(Self {
            name: name.into(),
            endpoint,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl ChannelTransport for GenericWebhookTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, alert: &AnomalyResult) -> Result<(), ChannelError> {
        let body = serde_json::to_value(alert)
            .map_err(|e| ChannelError::Delivery(format!("serialization failed: {e}")))?;
        post_json(&self.client, &self.endpoint, &body).await
    }
}
