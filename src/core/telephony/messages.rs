use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Frame received from the telephony provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// Socket-level hello, sent before `start`.
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },

    /// Stream metadata. Carries the stream id every outbound frame must echo.
    Start { start: StreamStart },

    Media { media: MediaPayload },

    /// Playback acknowledgement for a previously sent mark.
    Mark {
        #[serde(default)]
        mark: Option<serde_json::Value>,
    },

    /// The call ended on the provider side.
    Stop {
        #[serde(default)]
        stop: Option<serde_json::Value>,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,

    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,

    #[serde(rename = "accountSid", default)]
    pub account_sid: Option<String>,

    #[serde(default)]
    pub tracks: Vec<String>,

    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,

    #[serde(rename = "mediaFormat", default)]
    pub media_format: Option<MediaFormat>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaFormat {
    #[serde(default)]
    pub encoding: String,
    #[serde(rename = "sampleRate", default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub channels: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaPayload {
    /// Base64 μ-law audio.
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Frame sent to the telephony provider.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyCommand {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}

impl TelephonyCommand {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        TelephonyCommand::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_event_parses() {
        let raw = json!({
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "MZ123",
                "callSid": "CA456",
                "accountSid": "AC789",
                "tracks": ["inbound"],
                "customParameters": {"caller": "ops"},
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            },
            "streamSid": "MZ123"
        });
        let event: TelephonyEvent = serde_json::from_value(raw).unwrap();
        let TelephonyEvent::Start { start } = event else {
            panic!("expected start");
        };
        assert_eq!(start.stream_sid, "MZ123");
        assert_eq!(start.call_sid.as_deref(), Some("CA456"));
        assert_eq!(start.media_format.unwrap().sample_rate, 8000);
        assert_eq!(start.custom_parameters["caller"], "ops");
    }

    #[test]
    fn test_minimal_frames_parse() {
        let media: TelephonyEvent =
            serde_json::from_str(r#"{"event":"media","media":{"payload":"AAA="}}"#).unwrap();
        assert_eq!(
            media,
            TelephonyEvent::Media {
                media: MediaPayload {
                    payload: "AAA=".to_string(),
                    track: None,
                    chunk: None,
                    timestamp: None,
                }
            }
        );

        let stop: TelephonyEvent = serde_json::from_str(r#"{"event":"stop"}"#).unwrap();
        assert_eq!(stop, TelephonyEvent::Stop { stop: None });

        let dtmf: TelephonyEvent =
            serde_json::from_str(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap();
        assert_eq!(dtmf, TelephonyEvent::Other);
    }

    #[test]
    fn test_outbound_media_shape() {
        let value = serde_json::to_value(TelephonyCommand::media("MZ1", "BBB=")).unwrap();
        assert_eq!(
            value,
            json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "BBB="}})
        );
    }
}
