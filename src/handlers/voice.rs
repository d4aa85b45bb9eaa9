//! Telephony webhook and media stream handlers.

use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::bridge::{CallSession, Leg, LegKind};
use crate::core::telephony::{stream_connect_twiml, stream_url};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Maximum WebSocket message size (1 MB). Media frames are a few hundred bytes.
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Answer an inbound call with TwiML that connects its media stream to
/// `/voice/stream` on this host.
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let host = state.config.public_host.clone().or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let Some(host) = host else {
        return Err(AppError::BadRequest("Missing Host header".to_string()));
    };

    let url = stream_url(&host);
    info!(stream_url = %url, "Answering incoming call");

    Ok((
        [(header::CONTENT_TYPE, "text/xml")],
        stream_connect_twiml(&url),
    )
        .into_response())
}

/// Upgrade the telephony media stream and bridge it to a fresh AI session.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state))
}

async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>) {
    let call_id = Uuid::new_v4().to_string();
    info!(call_id = %call_id, "Media stream connected");

    let telephony = Leg::from_axum(socket, LegKind::Telephony);

    let Some(connector) = state.connector.as_ref() else {
        warn!(call_id = %call_id, "Realtime AI not configured, dropping call");
        return;
    };

    let session = CallSession::new(call_id.clone());
    state.sessions.register(session.clone());

    let ai = match connector.connect().await {
        Ok(stream) => Leg::from_tungstenite(stream, LegKind::Ai),
        Err(e) => {
            error!(call_id = %call_id, error = %e, "Failed to connect realtime AI");
            state.sessions.remove(&call_id);
            return;
        }
    };

    let session_update = connector.session_update(state.tools.definitions());
    if let Err(e) = ai.sender().send_json(&session_update).await {
        error!(call_id = %call_id, error = %e, "Failed to configure AI session");
        state.sessions.remove(&call_id);
        return;
    }

    let exit = state.bridge.run(session, telephony, ai).await;

    state.sessions.remove(&call_id);
    info!(call_id = %call_id, ?exit, "Call ended");
}
