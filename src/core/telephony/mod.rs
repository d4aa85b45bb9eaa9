//! Telephony media-stream leg.
//!
//! The telephony provider streams a call over a WebSocket as JSON frames
//! tagged by `event`: `connected`, `start`, `media`, `mark` and `stop`.
//! Audio is base64 8 kHz μ-law in `media.payload`.

mod messages;
mod twiml;

pub use messages::{MediaFormat, MediaPayload, OutboundMedia, StreamStart, TelephonyCommand, TelephonyEvent};
pub use twiml::{stream_connect_twiml, stream_url};
