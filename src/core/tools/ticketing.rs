//! Incident ticket tools backed by the ServiceNow Table API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{ToolContext, ToolDefinition, ToolError, ToolHandler, parse_args, require_non_empty};
use crate::config::SecretString;

pub const TICKETING_TOOLS: [&str; 5] = [
    "query_servicenow_ticket",
    "create_servicenow_ticket",
    "update_servicenow_ticket",
    "close_servicenow_ticket",
    "list_open_tickets",
];

const INCIDENT_TABLE: &str = "api/now/table/incident";
const TICKET_FIELDS: &str = "sys_id,number,short_description,description,state,priority,assigned_to,opened_at,sys_updated_on,work_notes,comments";
const LIST_FIELDS: &str = "number,short_description,priority,state";
const LIST_LIMIT: u32 = 20;

/// Ticket numbers are interpolated into `sysparm_query`, so only plain
/// incident numbers are accepted.
static INCIDENT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^INC\d+$").expect("incident number pattern is valid"));

const DEFAULT_PRIORITY: &str = "3";
const DEFAULT_CLOSE_CODE: &str = "Solved";
const STATE_CLOSED: &str = "7";

/// Fields for a new incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTicket {
    pub short_description: String,
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_priority() -> String {
    DEFAULT_PRIORITY.to_string()
}

/// Partial update for an existing incident.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TicketUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl TicketUpdate {
    fn is_empty(&self) -> bool {
        self.work_notes.is_none() && self.state.is_none()
    }
}

/// Incident ticket operations.
#[async_trait]
pub trait TicketingBackend: Send + Sync {
    async fn get_ticket(&self, number: &str) -> Result<Value, ToolError>;

    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Value, ToolError>;

    async fn update_ticket(&self, number: &str, update: &TicketUpdate) -> Result<Value, ToolError>;

    async fn close_ticket(
        &self,
        number: &str,
        resolution_notes: &str,
        close_code: &str,
    ) -> Result<Value, ToolError>;

    async fn list_open_tickets(&self) -> Result<Value, ToolError>;
}

/// Connection settings for [`ServiceNowClient`].
#[derive(Debug, Clone)]
pub struct ServiceNowConfig {
    pub instance_url: String,
    pub username: String,
    pub password: SecretString,
    pub assignment_group: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TableList {
    #[serde(default)]
    result: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TableRecord {
    result: Value,
}

/// ServiceNow Table API client using basic auth.
pub struct ServiceNowClient {
    client: reqwest::Client,
    config: ServiceNowConfig,
}

impl ServiceNowClient {
    pub fn new(config: ServiceNowConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ToolError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn table_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.instance_url.trim_end_matches('/'),
            INCIDENT_TABLE
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.config.username, Some(self.config.password.expose()))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, ToolError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ToolError::Backend(format!(
                "ServiceNow returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )))
        }
    }

    async fn find_by_number(&self, number: &str) -> Result<Value, ToolError> {
        let number = normalize_number(number)?;
        let query = format!("number={number}");
        let request = self.request(reqwest::Method::GET, self.table_url()).query(&[
            ("sysparm_query", query.as_str()),
            ("sysparm_limit", "1"),
            ("sysparm_display_value", "true"),
            ("sysparm_fields", TICKET_FIELDS),
        ]);
        let list: TableList = Self::send(request).await?.json().await?;
        list.result
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::Backend(format!("Ticket {number} not found")))
    }

    async fn patch(&self, number: &str, body: Value) -> Result<Value, ToolError> {
        let ticket = self.find_by_number(number).await?;
        let sys_id = ticket
            .get("sys_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Backend(format!("Ticket {number} has no sys_id")))?;

        let url = format!("{}/{}", self.table_url(), sys_id);
        let request = self.request(reqwest::Method::PATCH, url).json(&body);
        let record: TableRecord = Self::send(request).await?.json().await?;
        Ok(record.result)
    }
}

#[async_trait]
impl TicketingBackend for ServiceNowClient {
    async fn get_ticket(&self, number: &str) -> Result<Value, ToolError> {
        debug!(ticket = %number, "Querying ServiceNow ticket");
        self.find_by_number(number).await
    }

    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Value, ToolError> {
        let mut body = json!({
            "short_description": ticket.short_description,
            "description": ticket.description,
            "priority": ticket.priority,
        });
        if let Some(group) = &self.config.assignment_group {
            body["assignment_group"] = json!(group);
        }

        let request = self
            .request(reqwest::Method::POST, self.table_url())
            .json(&body);
        let record: TableRecord = Self::send(request).await?.json().await?;
        let number = record
            .result
            .get("number")
            .and_then(Value::as_str)
            .unwrap_or("?");
        info!(ticket = %number, "Created ServiceNow ticket");
        Ok(json!({
            "number": record.result.get("number"),
            "sys_id": record.result.get("sys_id"),
        }))
    }

    async fn update_ticket(&self, number: &str, update: &TicketUpdate) -> Result<Value, ToolError> {
        let body = serde_json::to_value(update)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let record = self.patch(number, body).await?;
        Ok(json!({
            "number": number,
            "state": record.get("state"),
            "updated": true,
        }))
    }

    async fn close_ticket(
        &self,
        number: &str,
        resolution_notes: &str,
        close_code: &str,
    ) -> Result<Value, ToolError> {
        let body = json!({
            "state": STATE_CLOSED,
            "close_code": close_code,
            "close_notes": resolution_notes,
        });
        self.patch(number, body).await?;
        Ok(json!({
            "number": number,
            "closed": true,
            "close_code": close_code,
        }))
    }

    async fn list_open_tickets(&self) -> Result<Value, ToolError> {
        let mut query = String::from("active=true^stateIN1,2,3");
        if let Some(group) = &self.config.assignment_group {
            query.push_str("^assignment_group=");
            query.push_str(group);
        }
        let limit = LIST_LIMIT.to_string();
        let request = self.request(reqwest::Method::GET, self.table_url()).query(&[
            ("sysparm_query", query.as_str()),
            ("sysparm_limit", limit.as_str()),
            ("sysparm_display_value", "true"),
            ("sysparm_fields", LIST_FIELDS),
        ]);
        let list: TableList = Self::send(request).await?.json().await?;
        Ok(json!({
            "count": list.result.len(),
            "tickets": list.result,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct TicketNumberArgs {
    ticket_number: String,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    ticket_number: String,
    #[serde(flatten)]
    update: TicketUpdate,
}

#[derive(Debug, Deserialize)]
struct CloseArgs {
    ticket_number: String,
    resolution_notes: String,
    #[serde(default)]
    close_code: Option<String>,
}

/// Exposes a [`TicketingBackend`] as the five ticket tools.
pub struct TicketingHandler {
    backend: Arc<dyn TicketingBackend>,
}

impl TicketingHandler {
    pub fn new(backend: Arc<dyn TicketingBackend>) -> Self {
        Self { backend }
    }
}

fn ticket_number_schema() -> Value {
    json!({"type": "string", "description": "ServiceNow ticket number like INC0010001"})
}

#[async_trait]
impl ToolHandler for TicketingHandler {
    fn backend(&self) -> &'static str {
        "servicenow"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::function(
                "query_servicenow_ticket",
                "Get information about a ServiceNow ticket by ticket number",
                json!({
                    "type": "object",
                    "properties": {"ticket_number": ticket_number_schema()},
                    "required": ["ticket_number"]
                }),
            ),
            ToolDefinition::function(
                "create_servicenow_ticket",
                "Create a new ServiceNow incident ticket",
                json!({
                    "type": "object",
                    "properties": {
                        "short_description": {"type": "string", "description": "Brief summary of the issue"},
                        "description": {"type": "string", "description": "Detailed description of the issue"},
                        "priority": {
                            "type": "string",
                            "description": "1-Critical, 2-High, 3-Moderate, 4-Low, 5-Planning",
                            "enum": ["1", "2", "3", "4", "5"]
                        }
                    },
                    "required": ["short_description", "description"]
                }),
            ),
            ToolDefinition::function(
                "update_servicenow_ticket",
                "Add work notes to a ServiceNow ticket or change its state",
                json!({
                    "type": "object",
                    "properties": {
                        "ticket_number": ticket_number_schema(),
                        "work_notes": {"type": "string", "description": "Work notes to add"},
                        "state": {
                            "type": "string",
                            "description": "1-New, 2-In Progress, 3-On Hold, 6-Resolved, 7-Closed",
                            "enum": ["1", "2", "3", "6", "7"]
                        }
                    },
                    "required": ["ticket_number"]
                }),
            ),
            ToolDefinition::function(
                "close_servicenow_ticket",
                "Close a ServiceNow ticket with resolution notes",
                json!({
                    "type": "object",
                    "properties": {
                        "ticket_number": ticket_number_schema(),
                        "resolution_notes": {"type": "string", "description": "How the issue was resolved"},
                        "close_code": {
                            "type": "string",
                            "enum": ["Solved", "Solved Remotely", "Not Solved", "Closed/Skipped"]
                        }
                    },
                    "required": ["ticket_number", "resolution_notes"]
                }),
            ),
            ToolDefinition::function(
                "list_open_tickets",
                "List open tickets in the network queue with number, description, priority and state",
                json!({"type": "object", "properties": {}, "required": []}),
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
            "query_servicenow_ticket" => {
                let args: TicketNumberArgs = parse_args(arguments)?;
                let number = normalize_number(&args.ticket_number)?;
                let ticket = self.backend.get_ticket(&number).await?;
                Ok(json!({ "ticket": ticket }))
            }
            "create_servicenow_ticket" => {
                let ticket: NewTicket = parse_args(arguments)?;
                require_non_empty("short_description", &ticket.short_description)?;
                self.backend.create_ticket(&ticket).await
            }
            "update_servicenow_ticket" => {
                let args: UpdateArgs = parse_args(arguments)?;
                let number = normalize_number(&args.ticket_number)?;
                if args.update.is_empty() {
                    return Err(ToolError::InvalidArguments(
                        "provide work_notes or state".to_string(),
                    ));
                }
                self.backend.update_ticket(&number, &args.update).await
            }
            "close_servicenow_ticket" => {
                let args: CloseArgs = parse_args(arguments)?;
                let number = normalize_number(&args.ticket_number)?;
                let close_code = args.close_code.as_deref().unwrap_or(DEFAULT_CLOSE_CODE);
                self.backend
                    .close_ticket(&number, &args.resolution_notes, close_code)
                    .await
            }
            "list_open_tickets" => self.backend.list_open_tickets().await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

fn normalize_number(raw: &str) -> Result<String, ToolError> {
    let number = require_non_empty("ticket_number", raw)?.to_uppercase();
    if !INCIDENT_NUMBER.is_match(&number) {
        return Err(ToolError::InvalidArguments(format!(
            "ticket_number must look like INC0010001, got '{}'",
            raw.trim()
        )));
    }
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TicketingBackend for Recording {
        async fn get_ticket(&self, number: &str) -> Result<Value, ToolError> {
            self.calls.lock().push(format!("get {number}"));
            Ok(json!({"number": number}))
        }

        async fn create_ticket(&self, ticket: &NewTicket) -> Result<Value, ToolError> {
            self.calls.lock().push(format!("create p{}", ticket.priority));
            Ok(json!({"number": "INC0000001"}))
        }

        async fn update_ticket(&self, number: &str, update: &TicketUpdate) -> Result<Value, ToolError> {
            self.calls
                .lock()
                .push(format!("update {number} {:?}", update.state));
            Ok(json!({}))
        }

        async fn close_ticket(&self, number: &str, _: &str, code: &str) -> Result<Value, ToolError> {
            self.calls.lock().push(format!("close {number} {code}"));
            Ok(json!({}))
        }

        async fn list_open_tickets(&self) -> Result<Value, ToolError> {
            Ok(json!({"count": 0, "tickets": []}))
        }
    }

    fn handler() -> (TicketingHandler, Arc<Recording>) {
        let backend = Arc::new(Recording::default());
        (TicketingHandler::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_query_uppercases_ticket_number() {
        let (handler, backend) = handler();
        let ctx = ToolContext::new("c", "i");
        let data = handler
            .handle("query_servicenow_ticket", json!({"ticket_number": "inc0012"}), &ctx)
            .await
            .unwrap();
        assert_eq!(data["ticket"]["number"], "INC0012");
        assert_eq!(backend.calls.lock().as_slice(), ["get INC0012"]);
    }

    #[tokio::test]
    async fn test_create_defaults_priority() {
        let (handler, backend) = handler();
        let ctx = ToolContext::new("c", "i");
        handler
            .handle(
                "create_servicenow_ticket",
                json!({"short_description": "WAN down", "description": "Site B offline"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(backend.calls.lock().as_slice(), ["create p3"]);
    }

    #[tokio::test]
    async fn test_close_defaults_close_code() {
        let (handler, backend) = handler();
        let ctx = ToolContext::new("c", "i");
        handler
            .handle(
                "close_servicenow_ticket",
                json!({"ticket_number": "INC1", "resolution_notes": "rebooted"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(backend.calls.lock().as_slice(), ["close INC1 Solved"]);
    }

    #[test]
    fn test_normalize_number_accepts_incident_numbers_only() {
        assert_eq!(normalize_number(" inc0010001 ").unwrap(), "INC0010001");
        for bad in ["INC1^NQACTIVE=TRUE", "INC", "CHG0001", "INC12 OR 1", "INC1^ORnumber=INC2"] {
            assert!(
                matches!(normalize_number(bad), Err(ToolError::InvalidArguments(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_query_operators_in_ticket_number_rejected() {
        let (handler, backend) = handler();
        let ctx = ToolContext::new("c", "i");
        for tool in ["query_servicenow_ticket", "update_servicenow_ticket", "close_servicenow_ticket"] {
            let err = handler
                .handle(
                    tool,
                    json!({
                        "ticket_number": "INC1^NQACTIVE=TRUE",
                        "work_notes": "x",
                        "resolution_notes": "x"
                    }),
                    &ctx,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)), "{tool}");
        }
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_update_without_changes_rejected() {
        let (handler, backend) = handler();
        let ctx = ToolContext::new("c", "i");
        let err = handler
            .handle("update_servicenow_ticket", json!({"ticket_number": "INC1"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(backend.calls.lock().is_empty());
    }
}
