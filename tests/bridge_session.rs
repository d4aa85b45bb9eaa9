//! Session bridge tests
//!
//! Drives a full call through the bridge using in-memory legs: one peer plays
//! the telephony provider, the other plays the realtime AI.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use callbridge::core::bridge::{
    BridgeExit, BridgeSettings, CallSession, Leg, LegKind, LegPeer, PreStartPolicy,
    SessionBridge, SessionState,
};
use callbridge::core::onprem::{OnPremBridge, OnPremConfig, SubmitOutcome};
use callbridge::core::tools::{
    DeviceHandler, ToolContext, ToolDefinition, ToolError, ToolHandler, ToolRouter,
};

/// Echoes its arguments. `slow` takes longer than `fast`.
struct EchoTools;

#[async_trait]
impl ToolHandler for EchoTools {
    fn backend(&self) -> &'static str {
        "echo"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let params = json!({"type": "object", "properties": {}});
        vec![
            ToolDefinition::function("slow", "Answers after a while", params.clone()),
            ToolDefinition::function("fast", "Answers immediately", params),
        ]
    }

    async fn handle(
        &self,
        tool: &str,
        arguments: Value,
        _ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        if tool == "slow" {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Ok(json!({"tool": tool, "args": arguments}))
    }
}

/// `held` answers only once the test releases it.
struct GatedTool {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ToolHandler for GatedTool {
    fn backend(&self) -> &'static str {
        "gated"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::function(
            "held",
            "Answers when released",
            json!({"type": "object", "properties": {}}),
        )]
    }

    async fn handle(
        &self,
        _tool: &str,
        _arguments: Value,
        _ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(json!({"released": true}))
    }
}

struct Call {
    session: CallSession,
    telephony: LegPeer,
    ai: LegPeer,
    handle: JoinHandle<BridgeExit>,
}

fn start_call(router: ToolRouter, settings: BridgeSettings) -> Call {
    let bridge = Arc::new(SessionBridge::new(Arc::new(router), settings));
    let (telephony_leg, telephony) = Leg::in_memory(LegKind::Telephony);
    let (ai_leg, ai) = Leg::in_memory(LegKind::Ai);
    let session = CallSession::new("call-test");

    let run_session = session.clone();
    let handle =
        tokio::spawn(async move { bridge.run(run_session, telephony_leg, ai_leg).await });

    Call {
        session,
        telephony,
        ai,
        handle,
    }
}

fn start_event(stream_sid: &str) -> Value {
    json!({
        "event": "start",
        "sequenceNumber": "1",
        "start": {
            "streamSid": stream_sid,
            "callSid": "CA123",
            "accountSid": "AC123",
            "tracks": ["inbound"],
            "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
        },
        "streamSid": stream_sid
    })
}

fn media_event(payload: &str) -> Value {
    json!({"event": "media", "media": {"track": "inbound", "payload": payload}})
}

fn audio_delta(delta: &str) -> Value {
    json!({"type": "response.audio.delta", "response_id": "resp_1", "item_id": "item_1", "delta": delta})
}

fn function_call_done(call_id: &str, name: Option<&str>, arguments: &str) -> Value {
    let mut event = json!({
        "type": "response.function_call_arguments.done",
        "call_id": call_id,
        "arguments": arguments
    });
    if let Some(name) = name {
        event["name"] = json!(name);
    }
    event
}

/// Parse the `output` string of a `conversation.item.create` frame.
fn tool_output(frame: &Value) -> Value {
    assert_eq!(frame["type"], "conversation.item.create");
    assert_eq!(frame["item"]["type"], "function_call_output");
    serde_json::from_str(frame["item"]["output"].as_str().unwrap()).unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_audio_flows_both_ways() {
    let mut call = start_call(ToolRouter::empty(), BridgeSettings::default());

    assert!(call.telephony.send_json(json!({"event": "connected", "protocol": "Call", "version": "1.0.0"})).await);
    assert!(call.telephony.send_json(start_event("MZ1")).await);
    assert!(call.telephony.send_json(media_event("Y2FsbGVy")).await);

    let append = call.ai.recv_json().await.unwrap();
    assert_eq!(
        append,
        json!({"type": "input_audio_buffer.append", "audio": "Y2FsbGVy"})
    );
    assert_eq!(call.session.state(), SessionState::Active);
    assert_eq!(call.session.stream_id().as_deref(), Some("MZ1"));

    assert!(call.ai.send_json(audio_delta("YWk=")).await);
    let media = call.telephony.recv_json().await.unwrap();
    assert_eq!(
        media,
        json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "YWk="}})
    );

    assert!(call.telephony.send_json(json!({"event": "stop", "stop": {"callSid": "CA123"}})).await);
    let exit = call.handle.await.unwrap();
    assert_eq!(exit, BridgeExit::TelephonyStopped);
    assert_eq!(call.session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_audio_before_start_is_buffered_in_order() {
    let mut call = start_call(ToolRouter::empty(), BridgeSettings::default());

    call.telephony.send_json(media_event("early-1")).await;
    call.telephony.send_json(media_event("early-2")).await;
    call.ai.send_json(audio_delta("ai-early")).await;
    settle().await;

    // Nothing leaves the bridge without a stream id.
    assert!(call.ai.outgoing.try_recv().is_err());
    assert!(call.telephony.outgoing.try_recv().is_err());
    assert_eq!(call.session.state(), SessionState::Connecting);

    call.telephony.send_json(start_event("MZ2")).await;
    call.telephony.send_json(media_event("late")).await;

    for expected in ["early-1", "early-2", "late"] {
        let frame = call.ai.recv_json().await.unwrap();
        assert_eq!(frame["audio"], expected);
    }

    let flushed = call.telephony.recv_json().await.unwrap();
    assert_eq!(flushed["streamSid"], "MZ2");
    assert_eq!(flushed["media"]["payload"], "ai-early");

    call.session.hang_up();
    assert_eq!(call.handle.await.unwrap(), BridgeExit::HungUp);
}

#[tokio::test]
async fn test_drop_policy_discards_audio_before_start() {
    let settings = BridgeSettings {
        prestart_policy: PreStartPolicy::Drop,
        ..BridgeSettings::default()
    };
    let mut call = start_call(ToolRouter::empty(), settings);

    call.telephony.send_json(media_event("early")).await;
    settle().await;
    call.telephony.send_json(start_event("MZ3")).await;
    call.telephony.send_json(media_event("late")).await;

    let frame = call.ai.recv_json().await.unwrap();
    assert_eq!(frame["audio"], "late");

    call.session.hang_up();
    call.handle.await.unwrap();
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let mut call = start_call(ToolRouter::empty(), BridgeSettings::default());

    call.telephony.send_raw("not json").await;
    call.telephony.send_json(json!({"event": "dtmf", "dtmf": {"digit": "1"}})).await;
    call.ai.send_raw("{\"type\": 42}").await;
    call.ai.send_json(json!({"type": "rate_limits.updated", "rate_limits": []})).await;

    call.telephony.send_json(start_event("MZ4")).await;
    call.telephony.send_json(media_event("still-alive")).await;
    assert_eq!(call.ai.recv_json().await.unwrap()["audio"], "still-alive");

    call.session.hang_up();
    assert_eq!(call.handle.await.unwrap(), BridgeExit::HungUp);
}

#[tokio::test(start_paused = true)]
async fn test_tool_outputs_follow_request_order() {
    let router = ToolRouter::builder()
        .with_handler(Arc::new(EchoTools))
        .build()
        .unwrap();
    let mut call = start_call(router, BridgeSettings::default());

    // The name for c1 only arrives with the output item.
    call.ai
        .send_json(json!({
            "type": "response.output_item.added",
            "response_id": "resp_1",
            "item": {"id": "item_1", "type": "function_call", "call_id": "c1", "name": "slow", "arguments": ""}
        }))
        .await;
    call.ai.send_json(function_call_done("c1", None, "{}")).await;
    call.ai
        .send_json(function_call_done("c2", Some("fast"), r#"{"x": 1}"#))
        .await;

    let first = call.ai.recv_json().await.unwrap();
    assert_eq!(first["item"]["call_id"], "c1");
    assert_eq!(
        tool_output(&first),
        json!({"success": true, "data": {"tool": "slow", "args": {}}})
    );
    assert_eq!(call.ai.recv_json().await.unwrap()["type"], "response.create");

    let second = call.ai.recv_json().await.unwrap();
    assert_eq!(second["item"]["call_id"], "c2");
    assert_eq!(tool_output(&second)["data"]["args"], json!({"x": 1}));
    assert_eq!(call.ai.recv_json().await.unwrap()["type"], "response.create");

    call.session.hang_up();
    call.handle.await.unwrap();
}

#[tokio::test]
async fn test_audio_keeps_flowing_while_tool_is_running() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let router = ToolRouter::builder()
        .with_handler(Arc::new(GatedTool {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        }))
        .build()
        .unwrap();
    let mut call = start_call(router, BridgeSettings::default());

    call.telephony.send_json(start_event("S1")).await;
    call.ai
        .send_json(function_call_done("c1", Some("held"), "{}"))
        .await;
    entered.notified().await;

    // Caller audio reaches the AI ahead of the tool output.
    call.telephony.send_json(media_event("Y2FsbGVy")).await;
    assert_eq!(
        call.ai.recv_json().await.unwrap(),
        json!({"type": "input_audio_buffer.append", "audio": "Y2FsbGVy"})
    );

    // AI audio reaches the caller while the tool is still held.
    call.ai.send_json(audio_delta("YWk=")).await;
    assert_eq!(
        call.telephony.recv_json().await.unwrap(),
        json!({"event": "media", "streamSid": "S1", "media": {"payload": "YWk="}})
    );

    release.notify_one();
    let output = call.ai.recv_json().await.unwrap();
    assert_eq!(output["item"]["call_id"], "c1");
    assert_eq!(tool_output(&output)["data"], json!({"released": true}));

    call.session.hang_up();
    assert_eq!(call.handle.await.unwrap(), BridgeExit::HungUp);
}

#[tokio::test]
async fn test_unknown_tool_and_bad_arguments_are_reported() {
    let router = ToolRouter::builder()
        .with_handler(Arc::new(EchoTools))
        .build()
        .unwrap();
    let settings = BridgeSettings {
        respond_after_tool_output: false,
        ..BridgeSettings::default()
    };
    let mut call = start_call(router, settings);

    call.ai
        .send_json(function_call_done("c1", Some("reboot_everything"), "{}"))
        .await;
    call.ai
        .send_json(function_call_done("c2", Some("fast"), "{not json"))
        .await;

    let unknown = tool_output(&call.ai.recv_json().await.unwrap());
    assert_eq!(unknown["success"], false);
    assert_eq!(unknown["error"], "unknown tool: reboot_everything");

    // No response.create in between when disabled.
    let bad_args = tool_output(&call.ai.recv_json().await.unwrap());
    assert_eq!(bad_args["success"], false);
    assert!(
        bad_args["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid arguments")
    );

    call.session.hang_up();
    call.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_onprem_tool_round_trip() {
    let onprem = Arc::new(OnPremBridge::default());
    let router = ToolRouter::builder()
        .with_handler(Arc::new(DeviceHandler::new(Arc::clone(&onprem))))
        .build()
        .unwrap();
    let mut call = start_call(router, BridgeSettings::default());

    call.ai
        .send_json(function_call_done(
            "c1",
            Some("get_device_vlans"),
            r#"{"device_name": "core-sw-01"}"#,
        ))
        .await;

    let request = loop {
        if let Some(request) = onprem.dequeue_next() {
            break request;
        }
        tokio::task::yield_now().await;
    };
    assert_eq!(request.tool, "get_device_vlans");
    assert_eq!(request.params["device_name"], "core-sw-01");

    let outcome = onprem.submit_result(&request.request_id, json!({"vlans": [10, 20]}));
    assert_eq!(outcome, SubmitOutcome::Delivered);

    let output = tool_output(&call.ai.recv_json().await.unwrap());
    assert_eq!(output, json!({"success": true, "data": {"vlans": [10, 20]}}));

    call.session.hang_up();
    call.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_onprem_timeout_reports_failure_and_late_result_is_orphaned() {
    let onprem = Arc::new(OnPremBridge::new(OnPremConfig {
        timeout: Duration::from_secs(10),
        orphan_ttl: Duration::from_secs(60),
    }));
    let router = ToolRouter::builder()
        .with_handler(Arc::new(DeviceHandler::new(Arc::clone(&onprem))))
        .build()
        .unwrap();
    let mut call = start_call(router, BridgeSettings::default());

    call.ai
        .send_json(function_call_done(
            "c1",
            Some("get_device_ntp"),
            r#"{"device_name": "edge-rtr-02"}"#,
        ))
        .await;

    let request = loop {
        if let Some(request) = onprem.dequeue_next() {
            break request;
        }
        tokio::task::yield_now().await;
    };

    // Nobody answers; paused time jumps to the deadline.
    let output = tool_output(&call.ai.recv_json().await.unwrap());
    assert_eq!(output, json!({"success": false, "error": "Request timed out"}));

    let outcome = onprem.submit_result(&request.request_id, json!({"ntp": "synced"}));
    assert_eq!(outcome, SubmitOutcome::Orphaned);
    assert_eq!(onprem.stats().orphans, 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(onprem.reap_orphans(), 1);

    call.session.hang_up();
    call.handle.await.unwrap();
}

#[tokio::test]
async fn test_ai_leg_close_ends_call() {
    let call = start_call(ToolRouter::empty(), BridgeSettings::default());
    let Call {
        session,
        mut telephony,
        ai,
        handle,
    } = call;

    drop(ai);
    assert_eq!(handle.await.unwrap(), BridgeExit::LegClosed(LegKind::Ai));
    assert_eq!(session.state(), SessionState::Closed);

    // The telephony side sees its leg shut once the session is gone.
    assert!(telephony.recv_json().await.is_none());
}

#[tokio::test]
async fn test_hang_up_cancels_pending_onprem_call() {
    let onprem = Arc::new(OnPremBridge::default());
    let router = ToolRouter::builder()
        .with_handler(Arc::new(DeviceHandler::new(Arc::clone(&onprem))))
        .build()
        .unwrap();
    let call = start_call(router, BridgeSettings::default());

    call.ai
        .send_json(function_call_done(
            "c1",
            Some("get_device_cdp"),
            r#"{"device_name": "sw1"}"#,
        ))
        .await;
    while onprem.stats().waiting == 0 {
        tokio::task::yield_now().await;
    }

    call.session.hang_up();
    assert_eq!(call.handle.await.unwrap(), BridgeExit::HungUp);
    assert_eq!(onprem.stats().waiting, 0);
}
