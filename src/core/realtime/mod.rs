//! Realtime conversational AI leg.
//!
//! The AI speaks a JSON event protocol over a WebSocket. This module holds the
//! wire types, per-deployment session settings and the connector that opens
//! one AI connection per call.

mod config;
mod connector;
mod messages;

pub use config::{
    AudioFormat, DEFAULT_INSTRUCTIONS, DEFAULT_REALTIME_MODEL, REALTIME_URL, RealtimeSettings,
    RealtimeVoice,
};
pub use connector::{RealtimeConnector, RealtimeStream};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, InputAudioTranscription, ResponseInfo, ServerEvent,
    SessionConfig, SessionInfo, TurnDetection,
};
