use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::errors::ServiceError;
use crate::AppState;

lazy_static::lazy_static! {
    static ref STARTED_AT: std::time::Instant = std::time::Instant::now();
}

/// Capture the process start time. Called once from bootstrap so the
/// first status request does not report zero uptime.
pub fn mark_started() {
    lazy_static::initialize(&STARTED_AT);
}

// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Liveness and database connectivity")
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    let database = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Ok(Json(json!({
        "status": if database == "healthy" { "healthy" } else { "unhealthy" },
        "database": database,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

// GET /api/v1/status
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Service build and uptime snapshot")
    ),
    tag = "Health"
)]
pub async fn api_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "settlement-api",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "build_time": option_env!("BUILD_TIME").unwrap_or("unknown"),
        "uptime_secs": STARTED_AT.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
