use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LlmConfig, LlmError, LlmResult, api_error, http_client};
use crate::config::SecretString;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5-20250929";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolUseRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Value],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

/// One assistant reply in a tool-use conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantTurn {
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Raw content blocks (`text`, `tool_use`), kept verbatim for history.
    #[serde(default)]
    pub content: Vec<Value>,
}

/// A `tool_use` block of an [`AssistantTurn`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl AssistantTurn {
    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect()
    }

    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter(|block| block["type"] == "tool_use")
            .map(|block| ToolUse {
                id: block["id"].as_str().unwrap_or_default().to_string(),
                name: block["name"].as_str().unwrap_or_default().to_string(),
                input: block
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default())),
            })
            .collect()
    }

    pub fn wants_tools(&self) -> bool {
        self.stop_reason.as_deref() == Some("tool_use")
    }
}

/// Anthropic messages API client.
pub struct AnthropicChat {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl AnthropicChat {
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        model: String,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_API_URL.to_string()),
        }
    }

    /// Build a standalone client. The provider field of `config` is ignored.
    pub fn from_config(config: LlmConfig) -> LlmResult<Self> {
        if config.api_key.expose().is_empty() {
            return Err(LlmError::MissingApiKey("anthropic"));
        }
        let model = config
            .model
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string());
        Ok(Self::new(http_client()?, config.api_key, model, config.base_url))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(super) async fn complete(&self, prompt: &str, max_tokens: u32) -> LlmResult<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("Anthropic", response).await);
        }

        let body: MessagesResponse = response.json().await?;
        // First text block; tool-use blocks carry no text.
        body.content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or(LlmError::EmptyResponse("Anthropic"))
    }

    /// Send a full conversation with tool declarations and return the reply.
    pub async fn converse(
        &self,
        system: &str,
        messages: &[Value],
        tools: &[Value],
        max_tokens: u32,
    ) -> LlmResult<AssistantTurn> {
        let request = ToolUseRequest {
            model: &self.model,
            max_tokens,
            system,
            messages,
            tools,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("Anthropic", response).await);
        }

        let turn: AssistantTurn = response.json().await?;
        if turn.content.is_empty() {
            return Err(LlmError::EmptyResponse("Anthropic"));
        }
        Ok(turn)
    }
}
