//! Realtime AI WebSocket events.
//!
//! Only the events the call bridge sends or reacts to are modelled. Anything
//! else the AI emits deserializes to [`ServerEvent::Unknown`] and is ignored.
//!
//! Client events (bridge → AI):
//! - session.update
//! - input_audio_buffer.append
//! - conversation.item.create (function_call_output)
//! - response.create
//!
//! Server events (AI → bridge):
//! - response.audio.delta
//! - response.function_call_arguments.done
//! - response.output_item.added
//! - response.done, transcripts, session lifecycle
//! - error

use serde::{Deserialize, Serialize};

use crate::core::tools::ToolDefinition;

// =============================================================================
// Session Configuration
// =============================================================================

/// Body of a `session.update` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// "auto", "none" or "required"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputAudioTranscription {
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad {
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item, as sent in `conversation.item.create` and received in
/// `response.output_item.added`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default)]
    pub item_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,

    /// Serialized tool result for `function_call_output` items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            item_type: "function_call_output".to_string(),
            call_id: Some(call_id.into()),
            output: Some(output.into()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Client Events (sent to the AI)
// =============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Base64 audio chunk, passed through without re-encoding.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate,
}

// =============================================================================
// Server Events (received from the AI)
// =============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ApiError,
    },

    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: SessionInfo,
    },

    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: SessionInfo,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(
        rename = "response.audio.delta",
        alias = "response.output_audio.delta"
    )]
    AudioDelta {
        /// Base64 audio chunk.
        delta: String,
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default)]
        response_id: Option<String>,
        item: ConversationItem,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        /// Not every AI revision repeats the name here; it is recovered from
        /// the matching `response.output_item.added` when absent.
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },

    #[serde(
        rename = "response.audio_transcript.done",
        alias = "response.output_audio_transcript.done"
    )]
    AudioTranscriptDone {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: String,
    pub param: Option<String>,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionInfo {
    pub id: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResponseInfo {
    pub id: Option<String>,
    pub status: Option<String>,
}
