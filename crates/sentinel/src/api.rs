//! HTTP API for cost tracking calls, anomaly scans, and operational probes
//!
//! Tracking endpoints follow the log-and-swallow contract: a malformed
//! tracking call is logged and answered with `recorded: false`, never a
//! 5xx, so a caller in the content-generation path cannot be broken by
//! cost bookkeeping.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    alert::AlertManager,
    anomaly::AnomalyDetector,
    cost::CostTracker,
    health::HealthRegistry,
    models::{AnomalyResult, TokenUsage},
    store::MetricStore,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<CostTracker>,
    pub store: Arc<MetricStore>,
    pub detector: Arc<AnomalyDetector>,
    pub alerter: Arc<AlertManager>,
    pub health: Arc<HealthRegistry>,
    /// Channels the manual /alerts/send endpoint defaults to
    pub alert_channels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TrackLlmRequest {
    model: String,
    input_tokens: u64,
    output_tokens: u64,
    persona_id: String,
    work_id: String,
    operation: String,
}

#[derive(Debug, Deserialize)]
struct TrackInfraRequest {
    service: String,
    cpu_cores: f64,
    memory_gb: f64,
    duration_minutes: f64,
    persona_id: String,
    work_id: String,
    operation: String,
}

#[derive(Debug, Deserialize)]
struct TrackVectorRequest {
    operation: String,
    query_count: u64,
    collection: String,
    persona_id: String,
    work_id: String,
}

fn track_response(result: Result<sentinel_lib::models::CostEvent, sentinel_lib::CostError>) -> impl IntoResponse {
    // Errors were already logged by the tracker; answer 200 either way
    match result {
        Ok(event) => (
            StatusCode::OK,
            Json(json!({"recorded": true, "amount_usd": event.amount_usd})),
        ),
        Err(e) => (
            StatusCode::OK,
            Json(json!({"recorded": false, "error": e.to_string()})),
        ),
    }
}

async fn track_llm(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrackLlmRequest>,
) -> impl IntoResponse {
    let result = state.tracker.track_llm_cost(
        &req.model,
        TokenUsage::new(req.input_tokens, req.output_tokens),
        &req.persona_id,
        &req.work_id,
        &req.operation,
    );
    track_response(result)
}

async fn track_infra(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrackInfraRequest>,
) -> impl IntoResponse {
    let result = state.tracker.track_infra_cost(
        &req.service,
        req.cpu_cores,
        req.memory_gb,
        req.duration_minutes,
        &req.persona_id,
        &req.work_id,
        &req.operation,
    );
    track_response(result)
}

async fn track_vector(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrackVectorRequest>,
) -> impl IntoResponse {
    let result = state.tracker.track_vector_cost(
        &req.operation,
        req.query_count,
        &req.collection,
        &req.persona_id,
        &req.work_id,
    );
    track_response(result)
}

/// Cost summary for one work unit; unknown ids report zero totals
async fn work_costs(
    State(state): State<Arc<AppState>>,
    Path(work_id): Path<String>,
) -> impl IntoResponse {
    Json(state.tracker.work_summary(&work_id))
}

async fn work_events(
    State(state): State<Arc<AppState>>,
    Path(work_id): Path<String>,
) -> impl IntoResponse {
    Json(state.tracker.events_for_work(&work_id))
}

#[derive(Debug, Deserialize)]
struct ScanRequest {
    #[serde(default)]
    scope: Option<String>,
}

/// On-demand anomaly scan over the metric store
async fn check_anomalies(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> impl IntoResponse {
    let results = state.detector.scan(&state.store, req.scope.as_deref());
    Json(json!({
        "count": results.len(),
        "anomalies_detected": results,
    }))
}

async fn anomaly_audit(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.detector.audit_log())
}

#[derive(Debug, Deserialize)]
struct SendAlertRequest {
    alert: AnomalyResult,
    #[serde(default)]
    channels: Option<Vec<String>>,
}

/// Manual alert dispatch, for runbooks and channel verification
async fn send_alert(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendAlertRequest>,
) -> impl IntoResponse {
    let channels = req.channels.unwrap_or_else(|| state.alert_channels.clone());
    let results = state.alerter.send_alert(&req.alert, &channels).await;
    Json(results)
}

/// Liveness: 200 while no subsystem has a standing fault
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    let status_code = if snapshot.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(snapshot))
}

/// Readiness: 200 once startup wiring completed and nothing is failing
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    let status_code = if snapshot.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(snapshot))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("metrics encoding failed: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/track/llm", post(track_llm))
        .route("/track/infra", post(track_infra))
        .route("/track/vector", post(track_vector))
        .route("/costs/:work_id", get(work_costs))
        .route("/costs/:work_id/events", get(work_events))
        .route("/anomalies/check", post(check_anomalies))
        .route("/anomalies", get(anomaly_audit))
        .route("/alerts/send", post(send_alert))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
