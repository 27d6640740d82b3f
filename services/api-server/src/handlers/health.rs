use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use bauxite_utils::{ApiReply, ApiResponse, BauxiteError};
use serde_json::{json, Value};

use crate::AppState;

/// `GET /health`: liveness plus a storage check.
pub async fn health_check(State(state): State<AppState>) -> ApiReply<Value> {
    let backend = state.repos.backend();
    let storage = match state.repos.health_check().await {
        Ok(()) => json!({"status": "healthy", "backend": backend, "message": "Connected"}),
        Err(e) => json!({"status": "unhealthy", "backend": backend, "message": e.to_string()}),
    };

    let healthy = storage["status"] == "healthy";
    let body = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "bauxite-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "storage": storage,
        }
    });

    let message = if healthy {
        "Service is healthy"
    } else {
        "Service is degraded"
    };
    ApiReply::ok(ApiResponse::ok(message, body))
}

/// `GET /metrics` in the Prometheus text format.
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, BauxiteError> {
    if !state.config.monitoring.metrics_enabled {
        return Err(BauxiteError::not_found("Metrics"));
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    ))
}
