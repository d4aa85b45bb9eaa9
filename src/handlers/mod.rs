//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and call administration
//! - `chat` - Text chat over the tool catalogue
//! - `onprem` - Poll/submit endpoints for the on-prem agent
//! - `voice` - Telephony webhook and media stream WebSocket

pub mod api;
pub mod chat;
pub mod onprem;
pub mod voice;

pub use voice::media_stream_handler;
