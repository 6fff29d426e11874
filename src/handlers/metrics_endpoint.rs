use axum::Json;
use serde_json::Value;

use crate::metrics::METRICS;

// GET /metrics, Prometheus text exposition
pub async fn metrics_text() -> String {
    METRICS.export_text()
}

// GET /metrics/json
pub async fn metrics_json() -> Json<Value> {
    Json(METRICS.export_json())
}
