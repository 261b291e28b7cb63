use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::api_state::ApiState;

/// Liveness probe: always returns 200 to indicate the process is running.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Readiness probe: 200 when the vector index answers a stats call, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let backend = state.index.backend_label();
    match state.index.describe().await {
        Ok(description) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "index": "ok" },
                "backend": backend,
                "records": description.record_count,
            })),
        ),
        Err(e) => {
            warn!(backend, error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "checks": { "index": "fail" },
                    "backend": backend,
                })),
            )
        }
    }
}
