//! HTTP API: dashboard readings, health checks, Prometheus metrics,
//! agent status and continuous-learning input

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use hvac_agent_lib::{
    control::ControlState,
    health::{ComponentStatus, HealthRegistry},
    observability::HvacMetrics,
    predictor::{LearningHandle, PredictionEngine, SubmitError},
    sensors::SensorSource,
    AgentStatus, LabeledSample, SensorSnapshot,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: HvacMetrics,
    pub sensors: Arc<dyn SensorSource>,
    pub control: ControlState,
    pub engine: Arc<PredictionEngine>,
    pub learning: LearningHandle,
    pub zone: String,
    pub setpoint: f64,
    pub deadband: f64,
    pub backend: String,
}

/// Current readings for the dashboard; defaults stand in for a failed read
async fn sensor_data(State(state): State<Arc<AppState>>) -> Json<SensorSnapshot> {
    match state.sensors.read().await {
        Ok(snapshot) => Json(snapshot),
        Err(e) => {
            warn!(error = %e, "Sensor read failed for dashboard, serving defaults");
            Json(SensorSnapshot::default())
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn status(State(state): State<Arc<AppState>>) -> Json<AgentStatus> {
    let stats = state.engine.stats();
    let (model_fingerprint, scaler_fingerprint) = state.engine.fingerprints().unzip();

    Json(AgentStatus {
        zone: state.zone.clone(),
        setpoint: state.setpoint,
        deadband: state.deadband,
        backend: state.backend.clone(),
        sensor_source: state.sensors.name().to_string(),
        model_loaded: stats.model_loaded,
        total_inferences: stats.total_inferences,
        total_trainings: stats.total_trainings,
        model_fingerprint,
        scaler_fingerprint,
        last_cycle: state.control.last_cycle().await,
        last_training: state.engine.last_report(),
    })
}

/// Queue a labeled sample for background retraining
async fn submit_sample(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LabeledSample>, JsonRejection>,
) -> impl IntoResponse {
    let sample = match payload {
        Ok(Json(sample)) => sample,
        Err(rejection) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": rejection.body_text() })),
            )
        }
    };

    let values = [
        sample.snapshot.temperature,
        sample.snapshot.humidity,
        sample.desired_temperature,
    ];
    if values.iter().any(|v| !v.is_finite()) || sample.snapshot.occupancy > 1 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "readings must be finite and occupancy 0 or 1" })),
        );
    }

    match state.learning.submit(sample) {
        Ok(()) => {
            info!(
                desired_temperature = sample.desired_temperature,
                "Labeled sample queued for retraining"
            );
            (StatusCode::ACCEPTED, Json(json!({ "status": "queued" })))
        }
        Err(e @ (SubmitError::Closed | SubmitError::Full)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sensor_data", get(sensor_data))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/samples", post(submit_sample))
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
