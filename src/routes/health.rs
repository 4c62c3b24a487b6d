use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::{debug, warn};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

/// Healthy only while the shared store answers; every request path and the
/// recalculation lock depend on it.
async fn health(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.store.ping().await {
        Ok(()) => {
            debug!("GET /health - store reachable");
            (StatusCode::OK, "OK")
        }
        Err(e) => {
            warn!("GET /health - store unreachable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}
