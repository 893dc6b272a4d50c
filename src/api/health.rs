use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use super::AppState;
use crate::context::Telemetry;
use crate::store::{ExtendedHealthReport, HealthTier, StoreStats};

/// Liveness plus the engine's health tier. Red answers 503 so load balancers drain us.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let tier = state.ctx.store().health().await;
    let (status_code, status) = match tier {
        HealthTier::Green => (StatusCode::OK, "healthy"),
        HealthTier::Yellow => (StatusCode::OK, "degraded"),
        HealthTier::Red => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    let response = json!({
        "status": status,
        "cluster": tier,
        "backend": state.ctx.store().backend_name(),
        "service": "hybrid-search-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    (status_code, Json(response))
}

pub async fn extended_health(State(state): State<AppState>) -> Json<ExtendedHealthReport> {
    Json(state.ctx.store().extended_health().await)
}

pub async fn stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(state.ctx.store().stats().await)
}

pub async fn telemetry(State(state): State<AppState>) -> Json<Telemetry> {
    Json(state.ctx.telemetry())
}
