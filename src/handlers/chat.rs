use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::core::chat::{ChatError, ChatReply};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct ChatHealthResponse {
    pub status: &'static str,
    pub agent: &'static str,
    pub llm: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub tools: usize,
}

/// One chat turn. The client echoes `conversation_history` back on the next turn.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("No message provided".to_string()));
    }
    let agent = state.chat.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("Chat requires ANTHROPIC_API_KEY".to_string())
    })?;

    match agent.chat(message, request.conversation_history).await {
        Ok(reply) => Ok(Json(reply)),
        Err(ChatError::Llm(e)) => {
            warn!(error = %e, "Chat LLM request failed");
            Err(AppError::ServiceUnavailable(e.to_string()))
        }
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

pub async fn chat_health(State(state): State<Arc<AppState>>) -> Json<ChatHealthResponse> {
    let agent = state.chat.as_ref();
    Json(ChatHealthResponse {
        status: if agent.is_some() { "ready" } else { "unavailable" },
        agent: "ChatAgent",
        llm: "anthropic",
        model: agent.map(|a| a.model().to_string()),
        tools: agent.map_or(0, |a| a.tool_count()),
    })
}
