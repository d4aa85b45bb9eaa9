use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, chat};
use crate::state::AppState;
use std::sync::Arc;

/// Health check, call administration and the chat channel.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/calls", get(api::list_calls))
        .route("/calls/{call_id}", delete(api::hang_up_call))
        .route("/api/chat", post(chat::chat))
        .route("/api/chat/health", get(chat::chat_health))
        .layer(TraceLayer::new_for_http())
}
