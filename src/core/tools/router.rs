use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{ToolContext, ToolDefinition, ToolError, ToolHandler, ToolInvocation, ToolResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolRouterError {
    #[error("tool '{name}' is declared by both {first} and {second}")]
    DuplicateTool {
        name: String,
        first: &'static str,
        second: &'static str,
    },
}

/// Collects handlers and checks that tool names are unique.
#[derive(Default)]
pub struct ToolRouterBuilder {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRouterBuilder {
    pub fn with_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<ToolRouter, ToolRouterError> {
        let mut routes: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        let mut definitions = Vec::new();

        for handler in self.handlers {
            for definition in handler.definitions() {
                if let Some(existing) = routes.get(&definition.name) {
                    return Err(ToolRouterError::DuplicateTool {
                        name: definition.name,
                        first: existing.backend(),
                        second: handler.backend(),
                    });
                }
                routes.insert(definition.name.clone(), Arc::clone(&handler));
                definitions.push(definition);
            }
        }

        info!(tools = definitions.len(), "Tool router built");
        Ok(ToolRouter {
            routes,
            definitions,
        })
    }
}

/// Static name → handler table. Built once at startup and shared by every call.
pub struct ToolRouter {
    routes: HashMap<String, Arc<dyn ToolHandler>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRouter {
    pub fn builder() -> ToolRouterBuilder {
        ToolRouterBuilder::default()
    }

    /// A router with no tools. Every invocation fails with "unknown tool".
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
            definitions: Vec::new(),
        }
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Parse the raw argument string of an invocation and route it.
    ///
    /// An empty argument string is treated as `{}`.
    pub async fn dispatch(&self, invocation: &ToolInvocation, ctx: &ToolContext) -> ToolResult {
        let raw = invocation.arguments.trim();
        let arguments = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        call_id = %ctx.call_id,
                        invocation_id = %invocation.invocation_id,
                        tool = %invocation.tool_name,
                        error = %e,
                        "Malformed tool arguments"
                    );
                    return ToolResult::from(&ToolError::InvalidArguments(e.to_string()));
                }
            }
        };
        self.route(&invocation.tool_name, arguments, ctx).await
    }

    /// Route a call to its handler. Never fails: every outcome, including a
    /// handler panic, is returned as a [`ToolResult`].
    pub async fn route(&self, tool: &str, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let Some(handler) = self.routes.get(tool) else {
            warn!(call_id = %ctx.call_id, tool = %tool, "Unknown tool requested");
            return ToolResult::from(&ToolError::UnknownTool(tool.to_string()));
        };

        debug!(
            call_id = %ctx.call_id,
            invocation_id = %ctx.invocation_id,
            tool = %tool,
            backend = handler.backend(),
            "Routing tool call"
        );

        let outcome = AssertUnwindSafe(handler.handle(tool, arguments, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(data)) => ToolResult::ok(data),
            Ok(Err(err)) => {
                warn!(
                    call_id = %ctx.call_id,
                    tool = %tool,
                    backend = handler.backend(),
                    error = %err,
                    "Tool call failed"
                );
                ToolResult::from(&err)
            }
            Err(_) => {
                error!(
                    call_id = %ctx.call_id,
                    tool = %tool,
                    backend = handler.backend(),
                    "Tool handler panicked"
                );
                ToolResult::from(&ToolError::Panicked)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        fn backend(&self) -> &'static str {
            "echo"
        }

        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![
                ToolDefinition::function("echo", "echo args", json!({"type": "object"})),
                ToolDefinition::function("explode", "panics", json!({"type": "object"})),
            ]
        }

        async fn handle(
            &self,
            tool: &str,
            arguments: Value,
            _ctx: &ToolContext,
        ) -> Result<Value, ToolError> {
            match tool {
                "echo" => Ok(arguments),
                "explode" => panic!("handler bug"),
                other => Err(ToolError::UnknownTool(other.to_string())),
            }
        }
    }

    struct Shadow;

    #[async_trait]
    impl ToolHandler for Shadow {
        fn backend(&self) -> &'static str {
            "shadow"
        }

        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::function("echo", "dup", json!({}))]
        }

        async fn handle(&self, _: &str, _: Value, _: &ToolContext) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    fn router() -> ToolRouter {
        ToolRouter::builder()
            .with_handler(Arc::new(Echo))
            .build()
            .unwrap()
    }

    fn invocation(tool: &str, arguments: &str) -> ToolInvocation {
        ToolInvocation {
            invocation_id: "call_1".to_string(),
            tool_name: tool.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ToolRouter::builder()
            .with_handler(Arc::new(Echo))
            .with_handler(Arc::new(Shadow))
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            ToolRouterError::DuplicateTool {
                name: "echo".to_string(),
                first: "echo",
                second: "shadow",
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_parses_arguments() {
        let ctx = ToolContext::new("c", "call_1");
        let result = router()
            .dispatch(&invocation("echo", r#"{"x": 1}"#), &ctx)
            .await;
        assert_eq!(result, ToolResult::ok(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_empty_arguments_become_object() {
        let ctx = ToolContext::new("c", "call_1");
        let result = router().dispatch(&invocation("echo", ""), &ctx).await;
        assert_eq!(result, ToolResult::ok(json!({})));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_normalized() {
        let ctx = ToolContext::new("c", "call_1");
        let result = router().dispatch(&invocation("nope", "{}"), &ctx).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_normalized() {
        let ctx = ToolContext::new("c", "call_1");
        let result = router().dispatch(&invocation("echo", "{not json"), &ctx).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("invalid arguments"));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let ctx = ToolContext::new("c", "call_1");
        let result = router().dispatch(&invocation("explode", "{}"), &ctx).await;
        assert_eq!(result, ToolResult::failure("tool handler panicked"));
    }
}
