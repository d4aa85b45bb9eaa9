//! Documentation search tool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{ToolContext, ToolDefinition, ToolError, ToolHandler, parse_args, require_non_empty};

pub const DOCUMENTATION_TOOLS: [&str; 1] = ["search_documentation"];

/// Number of passages returned when the caller does not ask for a count.
pub const DEFAULT_TOP_K: usize = 3;

pub const NO_DOCUMENTATION_FOUND: &str = "No relevant documentation found";

/// A passage returned by a [`DocumentSearch`] backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHit {
    pub source: String,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default)]
    pub score: f32,
}

/// Semantic search over the documentation corpus.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<DocumentHit>, ToolError>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<DocumentHit>,
}

/// Search service reached over HTTP: `POST {url}` with `{query, top_k}`,
/// answering `{results: [{source, text, score}]}`.
pub struct HttpDocumentSearch {
    client: reqwest::Client,
    url: String,
}

impl HttpDocumentSearch {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DocumentSearch for HttpDocumentSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<DocumentHit>, ToolError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SearchRequest { query, top_k })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Backend(format!(
                "documentation search returned {status}"
            )));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.results)
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

pub struct DocumentationHandler {
    search: Arc<dyn DocumentSearch>,
    default_top_k: usize,
}

impl DocumentationHandler {
    pub fn new(search: Arc<dyn DocumentSearch>, default_top_k: usize) -> Self {
        Self {
            search,
            default_top_k: default_top_k.max(1),
        }
    }
}

#[async_trait]
impl ToolHandler for DocumentationHandler {
    fn backend(&self) -> &'static str {
        "documentation"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::function(
            "search_documentation",
            "Search internal network documentation and runbooks",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What to look for"},
                    "top_k": {"type": "integer", "description": "Number of passages to return"}
                },
                "required": ["query"]
            }),
        )]
    }

    async fn handle(
        &self,
        tool: &str,
        arguments: Value,
        _ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        if tool != "search_documentation" {
            return Err(ToolError::UnknownTool(tool.to_string()));
        }
        let args: SearchArgs = parse_args(arguments)?;
        let query = require_non_empty("query", &args.query)?;
        let top_k = args.top_k.unwrap_or(self.default_top_k).max(1);

        let hits = self.search.search(query, top_k).await?;
        debug!(query = %query, hits = hits.len(), "Documentation search finished");

        if hits.is_empty() {
            return Ok(json!({ "message": NO_DOCUMENTATION_FOUND }));
        }

        let results: Vec<Value> = hits
            .into_iter()
            .take(top_k)
            .map(|hit| {
                json!({
                    "source": hit.source,
                    "content": hit.text,
                    "relevance_score": hit.score,
                })
            })
            .collect();
        Ok(json!({ "results": results }))
    }
}
