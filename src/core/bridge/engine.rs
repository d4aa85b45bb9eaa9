use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesOrdered;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::encoder::send_tool_output;
use super::leg::InboundFrame;
use super::prestart::{DEFAULT_PRESTART_BUFFER_FRAMES, PreStartBuffer, PreStartPolicy};
use super::{BridgeError, CallSession, Leg, LegKind, LegSender};
use crate::core::realtime::{ClientEvent, ServerEvent};
use crate::core::telephony::{TelephonyCommand, TelephonyEvent};
use crate::core::tools::{ToolContext, ToolInvocation, ToolResult, ToolRouter};

type ToolCompletion = (ToolInvocation, ToolResult, Duration);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub prestart_policy: PreStartPolicy,
    /// Per direction.
    pub prestart_buffer_frames: usize,
    /// Send `response.create` after each tool output.
    pub respond_after_tool_output: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            prestart_policy: PreStartPolicy::Buffer,
            prestart_buffer_frames: DEFAULT_PRESTART_BUFFER_FRAMES,
            respond_after_tool_output: true,
        }
    }
}

/// Why a call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeExit {
    /// Telephony sent `stop`.
    TelephonyStopped,
    /// A leg's socket closed.
    LegClosed(LegKind),
    /// A leg's socket failed.
    LegFailed { leg: LegKind, message: String },
    /// Hang-up requested through the session handle.
    HungUp,
    /// A relay loop died unexpectedly.
    Internal(String),
}

impl From<BridgeError> for BridgeExit {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::LegClosed(leg) => BridgeExit::LegClosed(leg),
            BridgeError::Transport { leg, message } => BridgeExit::LegFailed { leg, message },
            other => BridgeExit::Internal(other.to_string()),
        }
    }
}

/// Runs call sessions. One instance serves every call.
pub struct SessionBridge {
    router: Arc<ToolRouter>,
    settings: BridgeSettings,
}

impl SessionBridge {
    pub fn new(router: Arc<ToolRouter>, settings: BridgeSettings) -> Self {
        Self { router, settings }
    }

    pub fn router(&self) -> &Arc<ToolRouter> {
        &self.router
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Bridge `telephony` and `ai` until either side ends the call.
    ///
    /// Returns once every task of the session has stopped and both legs have
    /// been closed.
    pub async fn run(&self, session: CallSession, telephony: Leg, ai: Leg) -> BridgeExit {
        let call_id = session.call_id().to_string();
        let started = Instant::now();
        let (telephony_rx, telephony_tx, telephony_tasks) = telephony.into_parts();
        let (ai_rx, ai_tx, ai_tasks) = ai.into_parts();
        let (tool_tx, tool_rx) = mpsc::unbounded_channel::<ToolInvocation>();

        info!(call_id = %call_id, "Call session started");

        let mut relays = JoinSet::new();
        relays.spawn(relay_caller_to_ai(
            session.clone(),
            telephony_rx,
            ai_tx.clone(),
            self.settings.clone(),
        ));
        relays.spawn(relay_ai_to_caller(
            session.clone(),
            ai_rx,
            telephony_tx,
            tool_tx,
            self.settings.clone(),
        ));
        let dispatcher = tokio::spawn(dispatch_tools(
            session.clone(),
            Arc::clone(&self.router),
            tool_rx,
            ai_tx,
            self.settings.respond_after_tool_output,
        ));

        let exit = match relays.join_next().await {
            Some(Ok(exit)) => exit,
            Some(Err(e)) => {
                error!(call_id = %call_id, error = %e, "Relay task failed");
                BridgeExit::Internal(e.to_string())
            }
            None => BridgeExit::Internal("no relay tasks".to_string()),
        };

        session.begin_close();
        relays.shutdown().await;
        dispatcher.abort();
        let _ = dispatcher.await;
        tokio::join!(telephony_tasks.close(), ai_tasks.close());
        session.mark_closed();

        info!(
            call_id = %call_id,
            exit = ?exit,
            duration_ms = started.elapsed().as_millis() as u64,
            "Call session ended"
        );
        exit
    }
}

/// Telephony → AI: forward caller audio, track stream start and stop.
async fn relay_caller_to_ai(
    session: CallSession,
    mut inbound: mpsc::Receiver<InboundFrame>,
    ai: LegSender,
    settings: BridgeSettings,
) -> BridgeExit {
    let cancel = session.cancel_token();
    let mut pending = PreStartBuffer::new(
        "caller_to_ai",
        settings.prestart_policy,
        settings.prestart_buffer_frames,
    );
    let mut started = false;

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return BridgeExit::HungUp,
            frame = inbound.recv() => frame,
        };
        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!(call_id = %session.call_id(), error = %e, "Telephony leg failed");
                return e.into();
            }
            None => {
                info!(call_id = %session.call_id(), "Telephony leg closed");
                return BridgeExit::LegClosed(LegKind::Telephony);
            }
        };

        let event = match serde_json::from_str::<TelephonyEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!(call_id = %session.call_id(), error = %e, "Ignoring malformed telephony frame");
                continue;
            }
        };

        match event {
            TelephonyEvent::Connected { protocol } => {
                debug!(call_id = %session.call_id(), protocol = ?protocol, "Telephony connected");
            }
            TelephonyEvent::Start { start } => {
                if started {
                    warn!(call_id = %session.call_id(), "Ignoring repeated start event");
                    continue;
                }
                started = true;
                info!(
                    call_id = %session.call_id(),
                    stream_id = %start.stream_sid,
                    provider_call_sid = ?start.call_sid,
                    buffered = pending.len(),
                    dropped = pending.dropped(),
                    "Telephony stream started"
                );
                session.start_stream(start.stream_sid, start.call_sid);
                for payload in pending.drain() {
                    if let Err(e) = append_caller_audio(&ai, payload).await {
                        return e.into();
                    }
                }
            }
            TelephonyEvent::Media { media } => {
                if started {
                    if let Err(e) = append_caller_audio(&ai, media.payload).await {
                        return e.into();
                    }
                } else {
                    pending.push(media.payload);
                }
            }
            TelephonyEvent::Mark { .. } => {
                trace!(call_id = %session.call_id(), "Telephony mark");
            }
            TelephonyEvent::Stop { .. } => {
                info!(call_id = %session.call_id(), "Telephony stream stopped");
                return BridgeExit::TelephonyStopped;
            }
            TelephonyEvent::Other => {
                trace!(call_id = %session.call_id(), "Ignoring telephony event");
            }
        }
    }
}

async fn append_caller_audio(ai: &LegSender, payload: String) -> Result<(), BridgeError> {
    ai.send_json(&ClientEvent::InputAudioBufferAppend { audio: payload })
        .await
}

/// AI → telephony: forward AI audio, hand function calls to the dispatcher.
async fn relay_ai_to_caller(
    session: CallSession,
    mut inbound: mpsc::Receiver<InboundFrame>,
    telephony: LegSender,
    tools: mpsc::UnboundedSender<ToolInvocation>,
    settings: BridgeSettings,
) -> BridgeExit {
    let cancel = session.cancel_token();
    let mut stream_rx = session.subscribe_stream_id();
    let mut stream_id: Option<String> = None;
    let mut pending = PreStartBuffer::new(
        "ai_to_caller",
        settings.prestart_policy,
        settings.prestart_buffer_frames,
    );
    // call_id → tool name, for function calls whose done event omits the name.
    let mut function_names: HashMap<String, String> = HashMap::new();

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return BridgeExit::HungUp,
            changed = stream_rx.changed(), if stream_id.is_none() => {
                if changed.is_err() {
                    return BridgeExit::Internal("session dropped".to_string());
                }
                let stream = StreamSync {
                    stream_id: &mut stream_id,
                    stream_rx: &mut stream_rx,
                    pending: &mut pending,
                };
                if let Err(e) = stream.sync(&telephony).await {
                    return e.into();
                }
                continue;
            }
            frame = inbound.recv() => frame,
        };

        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!(call_id = %session.call_id(), error = %e, "AI leg failed");
                return e.into();
            }
            None => {
                info!(call_id = %session.call_id(), "AI leg closed");
                return BridgeExit::LegClosed(LegKind::Ai);
            }
        };

        let event = match serde_json::from_str::<ServerEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!(call_id = %session.call_id(), error = %e, "Ignoring malformed AI event");
                continue;
            }
        };

        match event {
            ServerEvent::AudioDelta { delta, .. } => {
                // Catch up on a stream start not yet observed, so buffered
                // audio always goes out before this delta.
                let stream = StreamSync {
                    stream_id: &mut stream_id,
                    stream_rx: &mut stream_rx,
                    pending: &mut pending,
                };
                if let Err(e) = stream.sync(&telephony).await {
                    return e.into();
                }
                match &stream_id {
                    Some(sid) => {
                        if let Err(e) = telephony
                            .send_json(&TelephonyCommand::media(sid.as_str(), delta))
                            .await
                        {
                            return e.into();
                        }
                    }
                    None => pending.push(delta),
                }
            }
            ServerEvent::OutputItemAdded { item, .. } => {
                if item.item_type == "function_call" {
                    if let (Some(call_id), Some(name)) = (item.call_id, item.name) {
                        function_names.insert(call_id, name);
                    }
                }
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                let recorded = function_names.remove(&call_id);
                let tool_name = name.or(recorded).unwrap_or_default();
                info!(
                    call_id = %session.call_id(),
                    invocation_id = %call_id,
                    tool = %tool_name,
                    "AI requested tool"
                );
                let invocation = ToolInvocation {
                    invocation_id: call_id,
                    tool_name,
                    arguments,
                };
                if tools.send(invocation).is_err() {
                    return BridgeExit::Internal("tool dispatcher stopped".to_string());
                }
            }
            ServerEvent::Error { error } => {
                error!(
                    call_id = %session.call_id(),
                    error_type = ?error.error_type,
                    code = ?error.code,
                    message = %error.message,
                    "Realtime AI reported an error"
                );
            }
            ServerEvent::SessionCreated { session: info } => {
                info!(
                    call_id = %session.call_id(),
                    ai_session_id = ?info.id,
                    model = ?info.model,
                    "AI session created"
                );
            }
            ServerEvent::SessionUpdated { .. } => {
                debug!(call_id = %session.call_id(), "AI session updated");
            }
            ServerEvent::SpeechStarted { .. } => {
                debug!(call_id = %session.call_id(), "Caller speech started");
            }
            ServerEvent::AudioTranscriptDone { transcript } => {
                info!(call_id = %session.call_id(), role = "assistant", transcript = %transcript, "Transcript");
            }
            ServerEvent::TranscriptionCompleted { transcript } => {
                info!(call_id = %session.call_id(), role = "caller", transcript = %transcript, "Transcript");
            }
            ServerEvent::ResponseDone { response } => {
                debug!(
                    call_id = %session.call_id(),
                    response_id = ?response.id,
                    status = ?response.status,
                    "AI response done"
                );
            }
            ServerEvent::Unknown => {
                trace!(call_id = %session.call_id(), "Ignoring AI event");
            }
        }
    }
}

/// Borrowed view of the AI relay's stream state.
struct StreamSync<'a> {
    stream_id: &'a mut Option<String>,
    stream_rx: &'a mut tokio::sync::watch::Receiver<Option<String>>,
    pending: &'a mut PreStartBuffer,
}

impl StreamSync<'_> {
    /// Adopt a newly published stream id and flush held audio to it.
    async fn sync(self, telephony: &LegSender) -> Result<(), BridgeError> {
        if self.stream_id.is_some() {
            return Ok(());
        }
        let published = self.stream_rx.borrow_and_update().clone();
        let Some(sid) = published else {
            return Ok(());
        };
        for payload in self.pending.drain() {
            telephony
                .send_json(&TelephonyCommand::media(sid.as_str(), payload))
                .await?;
        }
        *self.stream_id = Some(sid);
        Ok(())
    }
}

/// Run tool calls concurrently, reply in the order they were requested.
async fn dispatch_tools(
    session: CallSession,
    router: Arc<ToolRouter>,
    mut invocations: mpsc::UnboundedReceiver<ToolInvocation>,
    ai: LegSender,
    respond_after_tool_output: bool,
) {
    let mut in_flight: FuturesOrdered<BoxFuture<'static, ToolCompletion>> = FuturesOrdered::new();

    loop {
        tokio::select! {
            invocation = invocations.recv() => {
                let Some(invocation) = invocation else { break };
                let router = Arc::clone(&router);
                let ctx = ToolContext {
                    call_id: session.call_id().to_string(),
                    invocation_id: invocation.invocation_id.clone(),
                    cancel: session.cancel_token().child_token(),
                };
                in_flight.push_back(async move {
                    let started = Instant::now();
                    let result = router.dispatch(&invocation, &ctx).await;
                    (invocation, result, started.elapsed())
                }
                .boxed());
            }
            Some((invocation, result, elapsed)) = in_flight.next(), if !in_flight.is_empty() => {
                info!(
                    call_id = %session.call_id(),
                    invocation_id = %invocation.invocation_id,
                    tool = %invocation.tool_name,
                    success = result.success,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Tool call finished"
                );
                if let Err(e) = send_tool_output(
                    &ai,
                    &invocation.invocation_id,
                    &result,
                    respond_after_tool_output,
                )
                .await
                {
                    warn!(call_id = %session.call_id(), error = %e, "Could not deliver tool output");
                    break;
                }
            }
        }
    }
    debug!(call_id = %session.call_id(), "Tool dispatcher stopped");
}
