use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::core::bridge::SessionSnapshot;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "OK" })
}

/// Active calls, oldest first.
pub async fn list_calls(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSnapshot>> {
    Json(state.sessions.snapshots())
}

/// Hang up a call by id.
pub async fn hang_up_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<StatusCode> {
    if state.sessions.hang_up(&call_id) {
        info!(call_id = %call_id, "Call hung up via API");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Call {call_id} not found")))
    }
}
