use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::voice;
use crate::state::AppState;
use std::sync::Arc;

/// Telephony routes
///
/// # Endpoints
///
/// - `POST /voice/incoming` - call webhook, answered with TwiML pointing at the stream
/// - `GET /voice/stream` - WebSocket upgrade for the call's media stream
///
/// The provider's webhook signature is not verified.
pub fn create_voice_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice/incoming", post(voice::incoming_call))
        .route("/voice/stream", get(voice::media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
