//! One side of a call, reduced to text frames in and text frames out.
//!
//! Each leg owns a reader task and a writer task around its socket, joined to
//! the bridge by mpsc channels. The bridge never touches a socket directly,
//! so the same relay loops drive an axum socket, a tungstenite client or an
//! in-memory peer in tests.

use std::fmt;
use std::time::Duration;

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace, warn};

use super::{BridgeError, BridgeResult};

/// Frames buffered between a socket and the relay loops.
const LEG_CHANNEL_CAPACITY: usize = 1024;

/// How long a closing leg may spend flushing queued frames.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub(crate) type InboundFrame = BridgeResult<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegKind {
    Telephony,
    Ai,
}

impl fmt::Display for LegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegKind::Telephony => f.write_str("telephony"),
            LegKind::Ai => f.write_str("ai"),
        }
    }
}

/// Cloneable handle for queueing outbound frames on a leg.
#[derive(Debug, Clone)]
pub struct LegSender {
    kind: LegKind,
    tx: mpsc::Sender<String>,
}

impl LegSender {
    pub fn kind(&self) -> LegKind {
        self.kind
    }

    pub async fn send_text(&self, text: String) -> BridgeResult<()> {
        self.tx
            .send(text)
            .await
            .map_err(|_| BridgeError::LegClosed(self.kind))
    }

    pub async fn send_json<T: Serialize>(&self, frame: &T) -> BridgeResult<()> {
        let text =
            serde_json::to_string(frame).map_err(|e| BridgeError::Encode(e.to_string()))?;
        self.send_text(text).await
    }
}

/// Reader and writer tasks of a leg.
pub(crate) struct LegTasks {
    kind: LegKind,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl LegTasks {
    /// Stop reading and give the writer a short window to flush and send a
    /// close frame. Every [`LegSender`] clone must be dropped first, otherwise
    /// the writer only stops when the grace period runs out.
    pub(crate) async fn close(mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                debug!(leg = %self.kind, "Leg writer did not finish in time");
                writer.abort();
            }
        }
    }
}

impl Drop for LegTasks {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

/// A leg ready to be handed to the bridge.
pub struct Leg {
    kind: LegKind,
    inbound: mpsc::Receiver<InboundFrame>,
    outbound: LegSender,
    tasks: LegTasks,
}

/// Test-side end of an in-memory leg.
pub struct LegPeer {
    /// Frames the bridge will read from the leg.
    pub incoming: mpsc::Sender<InboundFrame>,
    /// Frames the bridge wrote to the leg.
    pub outgoing: mpsc::Receiver<String>,
}

impl LegPeer {
    pub async fn send_json(&self, value: serde_json::Value) -> bool {
        self.incoming.send(Ok(value.to_string())).await.is_ok()
    }

    pub async fn send_raw(&self, text: &str) -> bool {
        self.incoming.send(Ok(text.to_string())).await.is_ok()
    }

    /// Next frame written by the bridge, parsed as JSON. `None` once the
    /// bridge has dropped the leg.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        loop {
            let text = self.outgoing.recv().await?;
            match serde_json::from_str(&text) {
                Ok(value) => return Some(value),
                Err(e) => warn!(error = %e, "Peer received non-JSON frame"),
            }
        }
    }
}

impl Leg {
    pub fn kind(&self) -> LegKind {
        self.kind
    }

    pub fn sender(&self) -> LegSender {
        self.outbound.clone()
    }

    /// Wrap an upgraded axum socket (the telephony side).
    pub fn from_axum(socket: WebSocket, kind: LegKind) -> Self {
        let (mut sink, mut stream) = socket.split();
        let (in_tx, in_rx) = mpsc::channel::<InboundFrame>(LEG_CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<String>(LEG_CHANNEL_CAPACITY);

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let frame = match msg {
                    Ok(AxumMessage::Text(text)) => Ok(text.as_str().to_owned()),
                    Ok(AxumMessage::Binary(data)) => {
                        trace!(leg = %kind, bytes = data.len(), "Ignoring binary frame");
                        continue;
                    }
                    Ok(AxumMessage::Ping(_)) | Ok(AxumMessage::Pong(_)) => continue,
                    Ok(AxumMessage::Close(frame)) => {
                        debug!(leg = %kind, ?frame, "Peer closed leg");
                        break;
                    }
                    Err(e) => Err(BridgeError::Transport {
                        leg: kind,
                        message: e.to_string(),
                    }),
                };
                let failed = frame.is_err();
                if in_tx.send(frame).await.is_err() || failed {
                    break;
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(AxumMessage::Text(text.into())).await {
                    warn!(leg = %kind, error = %e, "Failed to write frame");
                    return;
                }
            }
            let _ = sink.send(AxumMessage::Close(None)).await;
        });

        Self::assemble(kind, in_rx, out_tx, reader, writer)
    }

    /// Wrap a tungstenite socket (the AI side, or a test peer).
    pub fn from_tungstenite<S>(socket: WebSocketStream<S>, kind: LegKind) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut stream) = socket.split();
        let (in_tx, in_rx) = mpsc::channel::<InboundFrame>(LEG_CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<String>(LEG_CHANNEL_CAPACITY);

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let frame = match msg {
                    Ok(WsMessage::Text(text)) => Ok(text.as_str().to_owned()),
                    Ok(WsMessage::Binary(data)) => {
                        trace!(leg = %kind, bytes = data.len(), "Ignoring binary frame");
                        continue;
                    }
                    Ok(WsMessage::Close(frame)) => {
                        debug!(leg = %kind, ?frame, "Peer closed leg");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => Err(BridgeError::Transport {
                        leg: kind,
                        message: e.to_string(),
                    }),
                };
                let failed = frame.is_err();
                if in_tx.send(frame).await.is_err() || failed {
                    break;
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                    warn!(leg = %kind, error = %e, "Failed to write frame");
                    return;
                }
            }
            let _ = sink.send(WsMessage::Close(None)).await;
        });

        Self::assemble(kind, in_rx, out_tx, reader, writer)
    }

    /// A leg backed by channels only.
    pub fn in_memory(kind: LegKind) -> (Self, LegPeer) {
        let (in_tx, in_rx) = mpsc::channel::<InboundFrame>(LEG_CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel::<String>(LEG_CHANNEL_CAPACITY);
        let leg = Self {
            kind,
            inbound: in_rx,
            outbound: LegSender { kind, tx: out_tx },
            tasks: LegTasks {
                kind,
                reader: None,
                writer: None,
            },
        };
        let peer = LegPeer {
            incoming: in_tx,
            outgoing: out_rx,
        };
        (leg, peer)
    }

    fn assemble(
        kind: LegKind,
        inbound: mpsc::Receiver<InboundFrame>,
        outbound: mpsc::Sender<String>,
        reader: JoinHandle<()>,
        writer: JoinHandle<()>,
    ) -> Self {
        Self {
            kind,
            inbound,
            outbound: LegSender { kind, tx: outbound },
            tasks: LegTasks {
                kind,
                reader: Some(reader),
                writer: Some(writer),
            },
        }
    }

    pub(crate) fn into_parts(self) -> (mpsc::Receiver<InboundFrame>, LegSender, LegTasks) {
        (self.inbound, self.outbound, self.tasks)
    }
}
