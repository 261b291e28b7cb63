use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use routes::{
    chat::chat,
    health::{live, ready},
    ingest::ingest_document,
};

pub mod api_auth;
pub mod api_state;
pub mod error;
mod routes;

/// Room for multipart boundaries and the credential field on top of the document itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Router for the document chat API.
pub fn api_routes<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    let body_limit = app_state
        .config
        .ingest_max_body_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route(
            "/ingest",
            post(ingest_document).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/chat", post(chat))
}
