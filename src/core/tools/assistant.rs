//! Free-form questions answered by the text LLM, optionally grounded in a
//! ticket mentioned in the question.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{
    TicketingBackend, ToolContext, ToolDefinition, ToolError, ToolHandler, parse_args,
    require_non_empty,
};
use crate::core::llm::LanguageModel;

pub const ASSISTANT_TOOLS: [&str; 2] = ["ask_assistant", "analyze_ticket"];

static TICKET_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bINC\d+\b").expect("ticket number pattern is valid"));

#[derive(Debug, Deserialize)]
struct AskArgs {
    question: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    ticket_number: String,
}

pub struct AssistantHandler {
    llm: Arc<dyn LanguageModel>,
    tickets: Option<Arc<dyn TicketingBackend>>,
}

impl AssistantHandler {
    pub fn new(llm: Arc<dyn LanguageModel>, tickets: Option<Arc<dyn TicketingBackend>>) -> Self {
        Self { llm, tickets }
    }

    /// Build the prompt for `question`, adding ticket details when it names one
    /// that can be fetched.
    async fn contextual_prompt(&self, question: &str) -> String {
        let (Some(tickets), Some(found)) = (&self.tickets, TICKET_NUMBER.find(question)) else {
            return question.to_string();
        };
        let number = found.as_str().to_uppercase();
        match tickets.get_ticket(&number).await {
            Ok(ticket) => ticket_prompt(&ticket, question),
            Err(e) => {
                warn!(ticket = %number, error = %e, "Could not load ticket for context");
                question.to_string()
            }
        }
    }
}

fn field<'a>(ticket: &'a Value, name: &str, fallback: &'a str) -> &'a str {
    ticket.get(name).and_then(Value::as_str).unwrap_or(fallback)
}

fn ticket_prompt(ticket: &Value, question: &str) -> String {
    format!(
        "Ticket Information:\n\
         - Number: {}\n\
         - Short Description: {}\n\
         - Description: {}\n\
         - State: {}\n\
         - Priority: {}\n\
         - Assigned To: {}\n\
         - Opened: {}\n\
         - Updated: {}\n\
         - Work Notes: {}\n\
         - Comments: {}\n\n\
         User question: {}\n\
         Provide a helpful answer based on the ticket information above.",
        field(ticket, "number", "unknown"),
        field(ticket, "short_description", ""),
        field(ticket, "description", ""),
        field(ticket, "state", ""),
        field(ticket, "priority", ""),
        field(ticket, "assigned_to", "unassigned"),
        field(ticket, "opened_at", ""),
        field(ticket, "sys_updated_on", ""),
        field(ticket, "work_notes", "No work notes"),
        field(ticket, "comments", "No comments"),
        question,
    )
}

#[async_trait]
impl ToolHandler for AssistantHandler {
    fn backend(&self) -> &'static str {
        "llm"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::function(
                "ask_assistant",
                "Ask a general networking or ticket question. Mention an incident number to include its details.",
                json!({
                    "type": "object",
                    "properties": {"question": {"type": "string"}},
                    "required": ["question"]
                }),
            ),
            ToolDefinition::function(
                "analyze_ticket",
                "Produce a troubleshooting analysis for a ServiceNow ticket",
                json!({
                    "type": "object",
                    "properties": {"ticket_number": {"type": "string"}},
                    "required": ["ticket_number"]
                }),
            ),
        ]
    }

    async fn handle(
        &self,
        tool: &str,
        arguments: Value,
        _ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        match tool {
            "ask_assistant" => {
                let args: AskArgs = parse_args(arguments)?;
                let question = require_non_empty("question", &args.question)?;
                let prompt = self.contextual_prompt(question).await;
                debug!(prompt_len = prompt.len(), "Asking LLM");
                let answer = self
                    .llm
                    .ask(&prompt)
                    .await
                    .map_err(|e| ToolError::Backend(e.to_string()))?;
                Ok(json!({ "answer": answer }))
            }
            "analyze_ticket" => {
                let args: AnalyzeArgs = parse_args(arguments)?;
                let number = require_non_empty("ticket_number", &args.ticket_number)?.to_uppercase();
                let tickets = self
                    .tickets
                    .as_ref()
                    .ok_or(ToolError::NotConfigured("ticketing backend"))?;
                let ticket = tickets.get_ticket(&number).await?;
                let analysis = self
                    .llm
                    .analyze(&format!("Analyze: {ticket}"))
                    .await
                    .map_err(|e| ToolError::Backend(e.to_string()))?;
                Ok(json!({ "ticket_number": number, "analysis": analysis }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::LlmResult;
    use crate::core::tools::{NewTicket, TicketUpdate};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Parrot {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for Parrot {
        async fn ask(&self, prompt: &str) -> LlmResult<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok("answer".to_string())
        }

        async fn analyze(&self, content: &str) -> LlmResult<String> {
            self.prompts.lock().push(content.to_string());
            Ok("analysis".to_string())
        }
    }

    struct OneTicket;

    #[async_trait]
    impl TicketingBackend for OneTicket {
        async fn get_ticket(&self, number: &str) -> Result<Value, ToolError> {
            if number == "INC0042" {
                Ok(json!({"number": "INC0042", "short_description": "Core switch flapping"}))
            } else {
                Err(ToolError::Backend(format!("Ticket {number} not found")))
            }
        }
        async fn create_ticket(&self, _: &NewTicket) -> Result<Value, ToolError> {
            unreachable!()
        }
        async fn update_ticket(&self, _: &str, _: &TicketUpdate) -> Result<Value, ToolError> {
            unreachable!()
        }
        async fn close_ticket(&self, _: &str, _: &str, _: &str) -> Result<Value, ToolError> {
            unreachable!()
        }
        async fn list_open_tickets(&self) -> Result<Value, ToolError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_question_with_ticket_gets_context() {
        let llm = Arc::new(Parrot::default());
        let handler = AssistantHandler::new(llm.clone(), Some(Arc::new(OneTicket)));
        let ctx = ToolContext::new("c", "i");

        let data = handler
            .handle(
                "ask_assistant",
                json!({"question": "what's going on with inc0042?"}),
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(data["answer"], "answer");
        let prompt = llm.prompts.lock()[0].clone();
        assert!(prompt.contains("Core switch flapping"));
        assert!(prompt.contains("what's going on with inc0042?"));
    }

    #[tokio::test]
    async fn test_unknown_ticket_falls_back_to_plain_question() {
        let llm = Arc::new(Parrot::default());
        let handler = AssistantHandler::new(llm.clone(), Some(Arc::new(OneTicket)));
        let ctx = ToolContext::new("c", "i");

        handler
            .handle("ask_assistant", json!({"question": "status of INC9"}), &ctx)
            .await
            .unwrap();
        assert_eq!(llm.prompts.lock()[0], "status of INC9");
    }

    #[tokio::test]
    async fn test_analyze_requires_ticketing() {
        let handler = AssistantHandler::new(Arc::new(Parrot::default()), None);
        let ctx = ToolContext::new("c", "i");
        let err = handler
            .handle("analyze_ticket", json!({"ticket_number": "INC0042"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }
}
