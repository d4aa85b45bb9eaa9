//! Poll/submit endpoints used by the on-prem agent.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::onprem::{OnPremStats, PendingRequest, SubmitOutcome};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub id: String,
    #[serde(default)]
    pub result: Value,
}

/// Hand the oldest pending request to the poller, or `null` when idle.
pub async fn poll(State(state): State<Arc<AppState>>) -> Json<Option<PendingRequest>> {
    let next = state.onprem.dequeue_next();
    if let Some(request) = &next {
        debug!(request_id = %request.request_id, tool = %request.tool, "Request polled");
    }
    Json(next)
}

/// Accept the poller's result for a request id.
pub async fn submit_response(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitResponseRequest>,
) -> AppResult<Json<Value>> {
    let id = body.id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("id must not be empty".to_string()));
    }

    match state.onprem.submit_result(id, body.result) {
        SubmitOutcome::Delivered => debug!(request_id = %id, "Response delivered"),
        SubmitOutcome::Orphaned => {
            info!(request_id = %id, "Response received with no waiting dispatcher")
        }
    }

    Ok(Json(json!({"status": "received"})))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<OnPremStats> {
    Json(state.onprem.stats())
}
