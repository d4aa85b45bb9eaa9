//! Text chat channel.
//!
//! A chat turn goes to Anthropic with the same tool catalogue the voice AI
//! sees. Tool-use replies are executed through the shared [`ToolRouter`] and
//! fed back until the model answers in plain text.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::llm::{AnthropicChat, LlmError};
use crate::core::tools::{ASSISTANT_TOOLS, ToolContext, ToolResult, ToolRouter};

/// Tool-use rounds allowed in one chat turn.
pub const MAX_TOOL_ROUNDS: usize = 5;

const CHAT_MAX_TOKENS: u32 = 4096;

const SYSTEM_PROMPT: &str = "You are an AI Network Operations Assistant helping network engineers.

You can query, create, update and close ServiceNow tickets, list open tickets, \
check network device status (VLANs, interfaces, CDP neighbors, spanning tree, NTP), \
search company documentation and answer questions about network operations.

Be concise and direct. When asked \"how many\", give the count unless asked for details. \
Use tools when you need real-time information.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("gave up after {0} tool rounds without a final answer")]
    TooManyToolRounds(usize),
}

/// Reply to one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub message: String,
    /// Full Anthropic message list, to be sent back with the next turn.
    pub conversation_history: Vec<Value>,
}

pub struct ChatAgent {
    llm: AnthropicChat,
    router: Arc<ToolRouter>,
    tools: Vec<Value>,
}

impl ChatAgent {
    /// Advertise every routed tool except the assistant ones, which would
    /// only call back into an LLM.
    pub fn new(llm: AnthropicChat, router: Arc<ToolRouter>) -> Self {
        let tools = router
            .definitions()
            .iter()
            .filter(|def| !ASSISTANT_TOOLS.contains(&def.name.as_str()))
            .map(|def| {
                json!({
                    "name": def.name,
                    "description": def.description,
                    "input_schema": def.parameters,
                })
            })
            .collect();
        Self { llm, router, tools }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub async fn chat(&self, message: &str, history: Vec<Value>) -> Result<ChatReply, ChatError> {
        let chat_id = Uuid::new_v4().to_string();
        let mut messages = history;
        messages.push(json!({"role": "user", "content": message}));

        for round in 0..=MAX_TOOL_ROUNDS {
            let turn = self
                .llm
                .converse(SYSTEM_PROMPT, &messages, &self.tools, CHAT_MAX_TOKENS)
                .await?;
            let tool_uses = turn.tool_uses();
            let text = turn.text();
            messages.push(json!({"role": "assistant", "content": turn.content.clone()}));

            if !turn.wants_tools() || tool_uses.is_empty() {
                info!(chat_id = %chat_id, rounds = round, "Chat turn answered");
                return Ok(ChatReply {
                    message: text,
                    conversation_history: messages,
                });
            }
            if round == MAX_TOOL_ROUNDS {
                break;
            }

            let results = join_all(tool_uses.iter().map(|tool_use| {
                let ctx = ToolContext::new(chat_id.clone(), tool_use.id.clone());
                let router = Arc::clone(&self.router);
                async move {
                    debug!(chat_id = %ctx.call_id, tool = %tool_use.name, "Chat tool call");
                    let result = router
                        .route(&tool_use.name, tool_use.input.clone(), &ctx)
                        .await;
                    tool_result_block(&tool_use.id, &result)
                }
            }))
            .await;
            messages.push(json!({"role": "user", "content": results}));
        }

        Err(ChatError::TooManyToolRounds(MAX_TOOL_ROUNDS))
    }
}

fn tool_result_block(tool_use_id: &str, result: &ToolResult) -> Value {
    let content = serde_json::to_string(result)
        .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"{e}"}}"#));
    let mut block = json!({
        "type": "tool_result",
        "tool_use_id": tool_use_id,
        "content": content,
    });
    if !result.success {
        block["is_error"] = json!(true);
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_tool_result_is_flagged() {
        let block = tool_result_block("tu_1", &ToolResult::failure("unknown tool: nope"));
        assert_eq!(block["tool_use_id"], "tu_1");
        assert_eq!(block["is_error"], true);
        let content: Value = serde_json::from_str(block["content"].as_str().unwrap()).unwrap();
        assert_eq!(content["error"], "unknown tool: nope");

        let ok = tool_result_block("tu_2", &ToolResult::ok(json!({"count": 2})));
        assert!(ok.get("is_error").is_none());
    }
}
