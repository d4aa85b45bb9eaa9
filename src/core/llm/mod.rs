//! Text LLM used by the assistant tools and the chat channel.
//!
//! Two providers are supported: OpenAI chat completions and Anthropic
//! messages. [`LlmService`] picks one at startup from configuration.

mod anthropic;
mod openai;

pub use anthropic::{
    ANTHROPIC_API_URL, AnthropicChat, AssistantTurn, DEFAULT_ANTHROPIC_MODEL, ToolUse,
};
pub use openai::{DEFAULT_OPENAI_MODEL, OPENAI_API_URL, OpenAiChat};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SecretString;

const ASK_MAX_TOKENS: u32 = 1024;
const ANALYZE_MAX_TOKENS: u32 = 2048;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} API key not set")]
    MissingApiKey(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("No response content from {0}")]
    EmptyResponse(&'static str),
}

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => DEFAULT_OPENAI_MODEL,
            LlmProvider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "gpt" => Ok(LlmProvider::OpenAi),
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            other => Err(format!("unknown LLM provider '{other}'")),
        }
    }
}

/// Question answering and analysis over plain text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short conversational answer.
    async fn ask(&self, prompt: &str) -> LlmResult<String>;

    /// Longer analysis, with a larger output budget.
    async fn analyze(&self, content: &str) -> LlmResult<String>;
}

/// Settings used to build an [`LlmService`].
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: SecretString,
    pub model: Option<String>,
    /// Overrides the provider endpoint. Used by tests and proxies.
    pub base_url: Option<String>,
}

pub enum LlmService {
    OpenAi(OpenAiChat),
    Anthropic(AnthropicChat),
}

impl LlmService {
    pub fn from_config(config: LlmConfig) -> LlmResult<Self> {
        if config.api_key.expose().is_empty() {
            return Err(LlmError::MissingApiKey(config.provider.as_str()));
        }
        let client = http_client()?;
        let model = config
            .model
            .unwrap_or_else(|| config.provider.default_model().to_string());

        Ok(match config.provider {
            LlmProvider::OpenAi => LlmService::OpenAi(OpenAiChat::new(
                client,
                config.api_key,
                model,
                config.base_url,
            )),
            LlmProvider::Anthropic => LlmService::Anthropic(AnthropicChat::new(
                client,
                config.api_key,
                model,
                config.base_url,
            )),
        })
    }

    pub fn provider(&self) -> LlmProvider {
        match self {
            LlmService::OpenAi(_) => LlmProvider::OpenAi,
            LlmService::Anthropic(_) => LlmProvider::Anthropic,
        }
    }
}

#[async_trait]
impl LanguageModel for LlmService {
    async fn ask(&self, prompt: &str) -> LlmResult<String> {
        match self {
            LlmService::OpenAi(chat) => chat.complete(prompt, ASK_MAX_TOKENS).await,
            LlmService::Anthropic(chat) => chat.complete(prompt, ASK_MAX_TOKENS).await,
        }
    }

    async fn analyze(&self, content: &str) -> LlmResult<String> {
        match self {
            LlmService::OpenAi(chat) => chat.complete(content, ANALYZE_MAX_TOKENS).await,
            LlmService::Anthropic(chat) => chat.complete(content, ANALYZE_MAX_TOKENS).await,
        }
    }
}

fn http_client() -> LlmResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

/// Turn a non-success response into [`LlmError::Api`].
async fn api_error(provider: &'static str, response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    LlmError::Api {
        provider,
        status,
        message,
    }
}
