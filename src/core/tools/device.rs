//! Network device queries served by the on-prem poller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolContext, ToolDefinition, ToolError, ToolHandler, parse_args, require_non_empty};
use crate::core::onprem::OnPremBridge;

pub const DEVICE_TOOLS: [&str; 4] = [
    "get_device_vlans",
    "get_device_cdp",
    "get_device_ntp",
    "get_device_spanning_tree",
];

#[derive(Debug, Deserialize)]
struct DeviceArgs {
    device_name: String,
}

/// Forwards device queries through the [`OnPremBridge`].
///
/// The poller receives `{tool, params}` where `params` carries the arguments
/// as the AI sent them.
pub struct DeviceHandler {
    bridge: Arc<OnPremBridge>,
}

impl DeviceHandler {
    pub fn new(bridge: Arc<OnPremBridge>) -> Self {
        Self { bridge }
    }
}

fn device_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "device_name": {
                "type": "string",
                "description": "Hostname of the network device, e.g. core-sw-01"
            }
        },
        "required": ["device_name"]
    })
}

#[async_trait]
impl ToolHandler for DeviceHandler {
    fn backend(&self) -> &'static str {
        "onprem"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::function(
                "get_device_vlans",
                "List the VLANs configured on a network device",
                device_parameters(),
            ),
            ToolDefinition::function(
                "get_device_cdp",
                "Show CDP neighbors of a network device",
                device_parameters(),
            ),
            ToolDefinition::function(
                "get_device_ntp",
                "Show NTP synchronization status of a network device",
                device_parameters(),
            ),
            ToolDefinition::function(
                "get_device_spanning_tree",
                "Show spanning tree state of a network device",
                device_parameters(),
            ),
        ]
    }

    async fn handle(
        &self,
        tool: &str,
        arguments: Value,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        if !DEVICE_TOOLS.contains(&tool) {
            return Err(ToolError::UnknownTool(tool.to_string()));
        }
        let args: DeviceArgs = parse_args(arguments.clone())?;
        require_non_empty("device_name", &args.device_name)?;

        let result = self
            .bridge
            .execute_with_cancel(tool, arguments, &ctx.cancel)
            .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::onprem::OnPremConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_device_query_round_trips_through_bridge() {
        let bridge = Arc::new(OnPremBridge::default());
        let handler = DeviceHandler::new(Arc::clone(&bridge));

        let poller = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                loop {
                    if let Some(req) = bridge.dequeue_next() {
                        assert_eq!(req.tool, "get_device_ntp");
                        assert_eq!(req.params["device_name"], "edge-1");
                        bridge.submit_result(&req.request_id, json!({"synced": true}));
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let ctx = ToolContext::new("call", "inv");
        let result = handler
            .handle("get_device_ntp", json!({"device_name": "edge-1"}), &ctx)
            .await
            .unwrap();
        poller.await.unwrap();
        assert_eq!(result, json!({"synced": true}));
    }

    #[tokio::test]
    async fn test_missing_device_name_is_rejected_without_enqueue() {
        let bridge = Arc::new(OnPremBridge::default());
        let handler = DeviceHandler::new(Arc::clone(&bridge));
        let ctx = ToolContext::new("call", "inv");

        let err = handler
            .handle("get_device_vlans", json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(bridge.dequeue_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_query_times_out() {
        let bridge = Arc::new(OnPremBridge::new(OnPremConfig {
            timeout: Duration::from_secs(10),
            orphan_ttl: Duration::from_secs(60),
        }));
        let handler = DeviceHandler::new(bridge);
        let ctx = ToolContext::new("call", "inv");

        let err = handler
            .handle("get_device_cdp", json!({"device_name": "x"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout));
    }
}
