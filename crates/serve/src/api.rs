//! HTTP API for predictions, event logging, health checks and Prometheus metrics

use crate::health::HealthRegistry;
use crate::worker::flush_once;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use modelfox::sync::QueueStats;
use modelfox::{
    Error, LogPredictionArgs, LogTrueValueArgs, Model, PredictInputs, PredictOptions,
    PredictOutputs,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Guards prediction and the log queue, never held across a request to the app
    pub model: Arc<Mutex<Model>>,
    /// Serializes flushes so each one removes only the events it sent
    pub flush_lock: Arc<Mutex<()>>,
    pub health: HealthRegistry,
}

impl AppState {
    pub fn new(model: Model, health: HealthRegistry) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
            flush_lock: Arc::new(Mutex::new(())),
            health,
        }
    }
}

/// Library errors mapped onto HTTP responses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::SchemaViolation(_) | Error::PredictionFailed(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::LogTransportFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::ModelLoadFailed(_) | Error::Io(_) | Error::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Body of `POST /predict`: bare inputs, or inputs together with options
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PredictRequest {
    WithOptions(PredictRequestWithOptions),
    Inputs(PredictInputs),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictRequestWithOptions {
    pub inputs: PredictInputs,
    #[serde(default)]
    pub options: Option<PredictOptions>,
}

impl PredictRequest {
    fn into_parts(self) -> (PredictInputs, Option<PredictOptions>) {
        match self {
            PredictRequest::WithOptions(request) => (request.inputs, request.options),
            PredictRequest::Inputs(inputs) => (inputs, None),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueResponse {
    pub queued: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlushResponse {
    pub sent: usize,
    pub queued: usize,
}

async fn root() -> &'static str {
    "Model loaded!"
}

async fn id(State(state): State<AppState>) -> Json<serde_json::Value> {
    let id = state.model.lock().await.id();
    Json(json!({ "model_id": id }))
}

async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictOutputs>, ApiError> {
    let (inputs, options) = request.into_parts();
    let model = state.model.lock().await;
    let outputs = model.predict_inputs(inputs, options.as_ref())?;
    Ok(Json(outputs))
}

async fn log_prediction(
    State(state): State<AppState>,
    Json(args): Json<LogPredictionArgs>,
) -> impl IntoResponse {
    let mut model = state.model.lock().await;
    model.enqueue_log_prediction(args);
    (
        StatusCode::ACCEPTED,
        Json(QueueResponse {
            queued: model.log_queue().len(),
        }),
    )
}

async fn log_true_value(
    State(state): State<AppState>,
    Json(args): Json<LogTrueValueArgs>,
) -> impl IntoResponse {
    let mut model = state.model.lock().await;
    model.enqueue_log_true_value(args);
    (
        StatusCode::ACCEPTED,
        Json(QueueResponse {
            queued: model.log_queue().len(),
        }),
    )
}

async fn queue(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.model.lock().await.log_queue().stats())
}

async fn flush(State(state): State<AppState>) -> Result<Json<FlushResponse>, ApiError> {
    let sent = flush_once(&state).await?;
    let queued = state.model.lock().await.log_queue().len();
    Ok(Json(FlushResponse { sent, queued }))
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.health().await;
    let status_code = match health.status {
        crate::health::ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/id", get(id))
        .route("/predict", post(predict))
        .route("/log/prediction", post(log_prediction))
        .route("/log/true_value", post(log_true_value))
        .route("/log/queue", get(queue))
        .route("/flush", post(flush))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    address: &str,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %address, "Starting API server");
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
