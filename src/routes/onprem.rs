use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::onprem;
use crate::state::AppState;
use std::sync::Arc;

/// Routes used by the on-prem agent. Poller auth is applied by the caller.
pub fn create_poller_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/poll", get(onprem::poll))
        .route("/submit_response", post(onprem::submit_response))
        .layer(TraceLayer::new_for_http())
}

pub fn create_onprem_status_router() -> Router<Arc<AppState>> {
    Router::new().route("/onprem/status", get(onprem::status))
}
