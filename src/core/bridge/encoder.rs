//! Turns tool results into AI-bound events.

use serde_json::json;

use super::{BridgeResult, LegSender};
use crate::core::realtime::{ClientEvent, ConversationItem};
use crate::core::tools::ToolResult;

/// `conversation.item.create` carrying `result` as a `function_call_output`
/// for `invocation_id`. The output field is the JSON text of the result.
pub fn encode_tool_output(invocation_id: &str, result: &ToolResult) -> ClientEvent {
    let output = serde_json::to_string(result).unwrap_or_else(|e| {
        json!({"success": false, "error": format!("failed to encode tool result: {e}")})
            .to_string()
    });
    ClientEvent::ConversationItemCreate {
        item: ConversationItem::function_call_output(invocation_id, output),
    }
}

/// Write a tool result to the AI, followed by `response.create` when
/// `request_response` is set so the AI speaks about it.
pub async fn send_tool_output(
    ai: &LegSender,
    invocation_id: &str,
    result: &ToolResult,
    request_response: bool,
) -> BridgeResult<()> {
    ai.send_json(&encode_tool_output(invocation_id, result))
        .await?;
    if request_response {
        ai.send_json(&ClientEvent::ResponseCreate).await?;
    }
    Ok(())
}
