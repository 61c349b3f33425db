//! Cost sentinel - real-time cost attribution and anomaly alerting service
//!
//! Receives per-resource cost tracking calls over HTTP, keeps rolling
//! per-persona metric windows, scans them for anomalies in the background,
//! and fans alerts out to the configured channels.

use anyhow::Result;
use sentinel_lib::{
    alert::{AlertManager, BotApiTransport, ChannelSettings, ChatWebhookTransport, GenericWebhookTransport},
    anomaly::{AnomalyDetector, DetectorConfig},
    cost::{CostTracker, TrackerConfig},
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    pricing::{PricingConfig, PricingResolver},
    scan::{ScanConfig, ScanLoop},
    store::MetricStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cost-sentinel");

    let config = config::SentinelConfig::load()?;
    info!(service_name = %config.service_name, api_port = config.api_port, "Sentinel configured");

    let health = Arc::new(HealthRegistry::new(Duration::from_secs(
        config.scan_interval_secs * 4,
    )));
    health.beat(components::COST_TRACKER);
    health.beat(components::METRIC_STORE);
    health.beat(components::DETECTOR);
    health.beat(components::ALERTER);

    let store = Arc::new(MetricStore::default());
    let pricing = PricingResolver::new(PricingConfig::default());
    let tracker = Arc::new(
        CostTracker::new(pricing, store.clone(), TrackerConfig::default())
            .with_health(health.clone()),
    );
    let detector = Arc::new(AnomalyDetector::new(DetectorConfig::default()));

    let (alerter, alert_channels) = build_alerter(&config);
    let alerter = Arc::new(alerter);
    info!(channels = ?alert_channels, "Alert channels registered");

    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(SENTINEL_VERSION);

    let app_state = Arc::new(api::AppState {
        tracker,
        store: store.clone(),
        detector: detector.clone(),
        alerter: alerter.clone(),
        health: health.clone(),
        alert_channels: alert_channels.clone(),
    });

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let scan = ScanLoop::new(
        detector,
        store,
        alerter,
        ScanConfig {
            interval: Duration::from_secs(config.scan_interval_secs),
            alert_channels,
            ..ScanConfig::default()
        },
    )
    .with_health(health.clone());
    let scan_handle = tokio::spawn(scan.run(shutdown_tx.subscribe()));

    health.set_ready(true);

    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            // A bind failure or server error must take the process down,
            // not leave it idling with a dead API.
            let err = match result {
                Ok(Ok(())) => anyhow::anyhow!("API server exited unexpectedly"),
                Ok(Err(e)) => e,
                Err(e) => anyhow::anyhow!(e),
            };
            logger.log_shutdown("API server exited");
            let _ = shutdown_tx.send(());
            return Err(err);
        }
    }

    let _ = shutdown_tx.send(());
    if tokio::time::timeout(Duration::from_secs(5), scan_handle)
        .await
        .is_err()
    {
        warn!("Scan loop did not stop within the shutdown grace period");
    }
    api_handle.abort();

    Ok(())
}

/// Register one transport per configured channel endpoint
fn build_alerter(config: &config::SentinelConfig) -> (AlertManager, Vec<String>) {
    let mut alerter = AlertManager::new(ChannelSettings {
        delivery_timeout: Duration::from_secs(config.alert_timeout_secs),
        dedup_window: Duration::from_secs(config.alert_dedup_window_secs),
        ..ChannelSettings::default()
    });

    if let Some(url) = &config.chat_webhook_url {
        match ChatWebhookTransport::new("chat", url) {
            Ok(transport) => alerter.register(Arc::new(transport)),
            Err(e) => warn!(error = %e, "Skipping chat channel"),
        }
    }
    if let (Some(token), Some(chat_id)) = (&config.bot_token, &config.bot_chat_id) {
        match BotApiTransport::new("bot", &config.bot_api_base, token, chat_id.clone()) {
            Ok(transport) => alerter.register(Arc::new(transport)),
            Err(e) => warn!(error = %e, "Skipping bot channel"),
        }
    }
    if let Some(url) = &config.webhook_url {
        match GenericWebhookTransport::new("webhook", url) {
            Ok(transport) => alerter.register(Arc::new(transport)),
            Err(e) => warn!(error = %e, "Skipping webhook channel"),
        }
    }

    let channels = alerter.channel_names();
    (alerter, channels)
}
