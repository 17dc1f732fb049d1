use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache_backend: &'static str,
    pub cache_ok: bool,
    pub chains: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Handler for GET /health
///
/// Writes and reads back a short-lived cache entry; a failed round trip
/// reports 503.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let probe = Utc::now().timestamp_millis();
    state.cache.set("health:probe", &probe, Some(Duration::from_secs(10))).await;
    let cache_ok = state.cache.get::<i64>("health:probe").await == Some(probe);

    let (status, label) = if cache_ok {
        (StatusCode::OK, "healthy")
    } else {
        tracing::warn!("Health check: cache round trip failed");
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: label,
            cache_backend: state.cache.backend(),
            cache_ok,
            chains: state.registry.chains().iter().map(|c| c.slug().to_string()).collect(),
            timestamp: Utc::now(),
        }),
    )
}

/// Handler for GET /health/ping
pub async fn ping() -> &'static str {
    "pong"
}
