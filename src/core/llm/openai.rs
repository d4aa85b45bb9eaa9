use serde::{Deserialize, Serialize};

use super::{LlmError, LlmResult, api_error};
use crate::config::SecretString;

pub const OPENAI_API_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
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
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat completions client.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiChat {
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
            base_url: base_url.unwrap_or_else(|| OPENAI_API_URL.to_string()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(super) async fn complete(&self, prompt: &str, max_tokens: u32) -> LlmResult<String> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("OpenAI", response).await);
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse("OpenAI"))
    }
}
