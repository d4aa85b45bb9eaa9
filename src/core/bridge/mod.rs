//! Call session bridge.
//!
//! Couples one telephony leg with one realtime AI leg for the lifetime of a
//! call:
//!
//! - caller audio is relayed to the AI as `input_audio_buffer.append`
//! - AI audio is relayed to the caller as telephony `media` frames
//! - AI function calls are routed to backend tools and the results are
//!   written back to the AI in invocation order
//!
//! The first leg to close (or a telephony `stop`) tears the whole session
//! down, including any tool calls still waiting on a backend.

mod encoder;
mod engine;
mod leg;
mod prestart;
mod registry;
mod session;

pub use encoder::{encode_tool_output, send_tool_output};
pub use engine::{BridgeExit, BridgeSettings, SessionBridge};
pub use leg::{Leg, LegKind, LegPeer, LegSender};
pub use prestart::{DEFAULT_PRESTART_BUFFER_FRAMES, PreStartBuffer, PreStartPolicy};
pub use registry::SessionRegistry;
pub use session::{CallSession, SessionSnapshot, SessionState};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The AI leg could not be opened.
    #[error("failed to connect realtime AI: {0}")]
    Connect(String),

    /// A leg's socket failed while reading or writing.
    #[error("{leg} transport error: {message}")]
    Transport { leg: LegKind, message: String },

    /// The leg's writer is gone; nothing more can be sent on it.
    #[error("{0} leg closed")]
    LegClosed(LegKind),

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
