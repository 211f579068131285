use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    engine::{Classification, DetectionEngine},
    error::AppError,
    metrics::{Metrics, MetricsSnapshot},
    storage::{PredictionRecord, PredictionStore},
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DetectionEngine>,
    pub metrics: Arc<Metrics>,
    pub predictions: Arc<PredictionStore>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/classify", post(classify_handler))
        .route("/predictions", get(predictions_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn classify_handler(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<Classification>, AppError> {
    let start = Instant::now();
    let result = state.engine.classify(&request.url);
    state
        .metrics
        .observe_request(start.elapsed(), result.as_ref().ok().map(|c| c.verdict.label));
    let classification = result?;

    let record = PredictionRecord::new(
        &classification.url,
        &classification.verdict.message,
        classification.verdict.suggestion.as_deref(),
    );
    if let Err(e) = state.predictions.insert(&record) {
        warn!("Failed to store prediction for {}: {}", classification.url, e);
    }

    info!(
        "Classified {} as {} ({:.2})",
        classification.url,
        classification.verdict.label.as_str(),
        classification.verdict.probability
    );
    Ok(Json(classification))
}

async fn predictions_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<PredictionRecord>>, AppError> {
    Ok(Json(state.predictions.all()?))
}

async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": if state.engine.model_available() { "healthy" } else { "degraded" },
        "model_loaded": state.engine.model_available(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
