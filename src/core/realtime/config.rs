//! Realtime AI session settings.
//!
//! Telephony media is 8 kHz G.711 μ-law, so the AI is told to both accept and
//! produce `g711_ulaw`. That lets the bridge forward base64 payloads untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::messages::{InputAudioTranscription, SessionConfig, TurnDetection};
use crate::core::tools::ToolDefinition;

/// Realtime API WebSocket endpoint.
pub const REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

pub const DEFAULT_INSTRUCTIONS: &str = "You are a network operations assistant on a phone call. \
Answer briefly. Use the available tools to look up tickets, network devices and documentation \
before answering questions about them.";

// =============================================================================
// Voices
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl RealtimeVoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }
}

impl FromStr for RealtimeVoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alloy" => Ok(Self::Alloy),
            "ash" => Ok(Self::Ash),
            "ballad" => Ok(Self::Ballad),
            "coral" => Ok(Self::Coral),
            "echo" => Ok(Self::Echo),
            "sage" => Ok(Self::Sage),
            "shimmer" => Ok(Self::Shimmer),
            "verse" => Ok(Self::Verse),
            other => Err(format!("unknown realtime voice '{other}'")),
        }
    }
}

impl fmt::Display for RealtimeVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Audio Formats
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// 8 kHz G.711 μ-law, what the telephony provider streams.
    #[default]
    G711Ulaw,
    G711Alaw,
    /// 24 kHz 16-bit PCM. Needs transcoding on a phone line.
    Pcm16,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
            Self::Pcm16 => "pcm16",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "g711_ulaw" | "ulaw" | "mulaw" => Ok(Self::G711Ulaw),
            "g711_alaw" | "alaw" => Ok(Self::G711Alaw),
            "pcm16" | "pcm" => Ok(Self::Pcm16),
            other => Err(format!("unknown audio format '{other}'")),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Per-deployment settings applied to every AI session.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    pub url: String,
    pub model: String,
    pub voice: RealtimeVoice,
    pub instructions: String,
    pub audio_format: AudioFormat,
    /// Transcribe caller speech so it shows up in logs.
    pub transcribe_input: bool,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: RealtimeVoice::default(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            audio_format: AudioFormat::default(),
            transcribe_input: true,
        }
    }
}

impl RealtimeSettings {
    /// Endpoint URL including the model query parameter.
    pub fn endpoint(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}model={}", self.url, separator, self.model)
    }

    /// Build the `session.update` body advertising `tools`.
    pub fn session_config(&self, tools: &[ToolDefinition]) -> SessionConfig {
        SessionConfig {
            modalities: Some(vec!["audio".to_string(), "text".to_string()]),
            instructions: Some(self.instructions.clone()),
            voice: Some(self.voice.as_str().to_string()),
            input_audio_format: Some(self.audio_format.as_str().to_string()),
            output_audio_format: Some(self.audio_format.as_str().to_string()),
            input_audio_transcription: self.transcribe_input.then(|| InputAudioTranscription {
                model: "whisper-1".to_string(),
            }),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: None,
                prefix_padding_ms: None,
                silence_duration_ms: None,
            }),
            tools: (!tools.is_empty()).then(|| tools.to_vec()),
            tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
        }
    }
}
