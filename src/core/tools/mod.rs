//! Tool invocation routing.
//!
//! The realtime AI asks for work by emitting function calls. Each call is
//! dispatched by name through a [`ToolRouter`] to the [`ToolHandler`] that
//! declared it, and every outcome is normalized into a [`ToolResult`].

mod assistant;
mod device;
mod documentation;
mod router;
mod ticketing;

pub use assistant::{ASSISTANT_TOOLS, AssistantHandler};
pub use device::{DEVICE_TOOLS, DeviceHandler};
pub use documentation::{
    DEFAULT_TOP_K, DOCUMENTATION_TOOLS, DocumentHit, DocumentSearch, DocumentationHandler,
    HttpDocumentSearch, NO_DOCUMENTATION_FOUND,
};
pub use router::{ToolRouter, ToolRouterBuilder, ToolRouterError};
pub use ticketing::{
    NewTicket, ServiceNowClient, ServiceNowConfig, TICKETING_TOOLS, TicketUpdate,
    TicketingBackend, TicketingHandler,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::onprem::OnPremError;

/// Errors a handler can report. All of them end up as a failed [`ToolResult`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Backend(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("tool handler panicked")]
    Panicked,
}

impl From<OnPremError> for ToolError {
    fn from(err: OnPremError) -> Self {
        match err {
            OnPremError::Timeout { .. } => ToolError::Timeout,
            OnPremError::Cancelled { .. } => ToolError::Cancelled,
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ToolError::Timeout
        } else {
            ToolError::Backend(err.to_string())
        }
    }
}

/// Normalized outcome of a tool invocation: `{success, data}` or `{success, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl From<&ToolError> for ToolResult {
    fn from(err: &ToolError) -> Self {
        ToolResult::failure(err.to_string())
    }
}

/// A function call requested by the AI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Correlates the eventual output with this call.
    pub invocation_id: String,
    pub tool_name: String,
    /// Raw JSON argument string as sent by the AI.
    pub arguments: String,
}

/// Declaration of a callable tool, advertised to the AI in `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Per-invocation context handed to handlers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub call_id: String,
    pub invocation_id: String,
    /// Fires when the owning call session tears down.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(call_id: impl Into<String>, invocation_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            invocation_id: invocation_id.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// A backend capable of serving one or more named tools.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Short backend label used in logs.
    fn backend(&self) -> &'static str;

    /// Tools this handler serves.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute `tool` with already-parsed JSON arguments.
    async fn handle(
        &self,
        tool: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError>;
}

/// Deserialize tool arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Reject empty or whitespace-only required strings.
pub(crate) fn require_non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ToolError::InvalidArguments(format!("{field} must not be empty")))
    } else {
        Ok(trimmed)
    }
}
