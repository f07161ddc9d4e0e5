//! HTTP surface: landing page, health and `/predict`

use crate::error::PredictError;
use crate::metrics::ServiceMetrics;
use crate::service::PredictionService;
use crate::types::{HealthResponse, PredictionResponse};
use anyhow::{anyhow, Context};
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

const INDEX_HTML: &str = include_str!("../templates/index.html");

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    service: Arc<PredictionService>,
    metrics: Arc<ServiceMetrics>,
    expose_error_details: bool,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        service: Arc<PredictionService>,
        metrics: Arc<ServiceMetrics>,
        expose_error_details: bool,
    ) -> Self {
        Self {
            service,
            metrics,
            expose_error_details,
            started_at: Utc::now(),
        }
    }
}

/// Build the application router
pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let host = state.service.host();
    let ready = host.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if ready { "ok" } else { "degraded" }.to_string(),
        model_loaded: ready,
        num_classes: host.num_classes(),
        num_labels: state.service.labels().len(),
        device: host.device(),
        started_at: state.started_at,
        uptime_secs: state.metrics.uptime().as_secs(),
        requests_total: state
            .metrics
            .requests
            .load(std::sync::atomic::Ordering::Relaxed),
    };

    (status, Json(body))
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let outcome = if !state.service.is_ready() {
        Err(PredictError::ModelUnavailable)
    } else {
        match read_upload(multipart).await {
            Ok(bytes) => run_prediction(state.service.clone(), bytes).await,
            Err(e) => Err(PredictError::Processing(e)),
        }
    };
    let elapsed = start.elapsed();

    match outcome {
        Ok(response) => {
            let best = response.best();
            state
                .metrics
                .record_success(elapsed, best.map(|b| b.label.as_str()));
            info!(
                request_id = %request_id,
                top_label = best.map(|b| b.label.as_str()).unwrap_or("-"),
                top_probability = best.map(|b| b.probability).unwrap_or(0.0),
                latency_us = elapsed.as_micros() as u64,
                "Prediction served"
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            state.metrics.record_failure(err.kind());
            warn!(
                request_id = %request_id,
                kind = err.kind(),
                error = %err,
                latency_us = elapsed.as_micros() as u64,
                "Prediction failed"
            );
            let body = err.to_body(state.expose_error_details);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Pull the image out of the form: the `file` field, else the first field
/// that carries a filename.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> anyhow::Result<Bytes> {
    let mut multipart = multipart.context("Request is not a multipart upload")?;
    let mut fallback = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .context("Failed to read multipart body")?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            return field.bytes().await.context("Failed to read uploaded file");
        }
        if fallback.is_none() && field.file_name().is_some() {
            fallback = Some(field.bytes().await.context("Failed to read uploaded file")?);
        }
    }

    fallback.ok_or_else(|| anyhow!("Missing multipart field `{}`", UPLOAD_FIELD))
}

/// Decode and infer off the async executor.
async fn run_prediction(
    service: Arc<PredictionService>,
    bytes: Bytes,
) -> Result<PredictionResponse, PredictError> {
    tokio::task::spawn_blocking(move || service.predict(&bytes))
        .await
        .map_err(|e| {
            let reason = if e.is_panic() {
                let payload = e.into_panic();
                payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string())
            } else {
                e.to_string()
            };
            PredictError::Processing(anyhow!("Inference task failed: {}", reason))
        })?
}
