//! Realtime API WebSocket message types.
//!
//! All events are JSON-encoded and sent over the control channel.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Persona instructions, voice and turn detection
//! - input_audio_buffer.append - Captured microphone audio
//! - conversation.item.create - Typed user message
//! - response.create - Ask for a response with per-response instructions
//!
//! Server events understood here:
//! - error
//! - session.created / session.updated
//! - input_audio_buffer.speech_started / speech_stopped
//! - conversation.item.input_audio_transcription.delta / completed
//! - response.started / response.created / response.audio_transcript.started
//! - response.audio_transcript.delta / done
//! - response.audio.delta
//! - response.done
//!
//! Everything else deserializes to [`ServerEvent::Unknown`].

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::realtime::base::{Modality, OutboundCommand, TurnDetectionConfig};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration sent with `session.update`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionConfig {
    /// System instructions for the assistant
    pub instructions: String,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
        create_response: bool,
    },
}

impl From<&TurnDetectionConfig> for TurnDetection {
    fn from(config: &TurnDetectionConfig) -> Self {
        TurnDetection::ServerVad {
            threshold: config.threshold,
            prefix_padding_ms: config.prefix_padding_ms,
            silence_duration_ms: config.silence_duration_ms,
            create_response: config.create_response,
        }
    }
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    /// Item type
    #[serde(rename = "type")]
    pub item_type: String,
    /// Item role (user, assistant, system)
    pub role: String,
    /// Content parts
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// A user message with a single `input_text` part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            item_type: "message".to_string(),
            role: "user".to_string(),
            content: vec![ContentPart {
                content_type: "input_text".to_string(),
                text: text.into(),
            }],
        }
    }
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize)]
pub struct ContentPart {
    /// Content type (input_text)
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text content
    pub text: String,
}

// =============================================================================
// Response Configuration
// =============================================================================

/// Response configuration for `response.create`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseConfig {
    /// Response modalities
    pub modalities: Vec<Modality>,
    /// Per-response instructions
    pub instructions: String,
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the realtime API.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Append audio to input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Create a response
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseConfig },
}

impl ClientEvent {
    /// Create an audio append event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    /// Translate an outbound command into its wire event.
    ///
    /// `voice` and `transcription_model` only affect `SessionConfigure`.
    pub fn from_command(
        command: OutboundCommand,
        voice: Option<&str>,
        transcription_model: Option<&str>,
    ) -> Self {
        match command {
            OutboundCommand::SessionConfigure {
                instructions,
                turn_detection,
            } => ClientEvent::SessionUpdate {
                session: SessionConfig {
                    instructions,
                    voice: voice.map(str::to_string),
                    input_audio_transcription: transcription_model.map(|model| {
                        InputAudioTranscription {
                            model: model.to_string(),
                        }
                    }),
                    turn_detection: Some(TurnDetection::from(&turn_detection)),
                },
            },
            OutboundCommand::CreateResponse {
                instructions,
                modalities,
            } => ClientEvent::ResponseCreate {
                response: ResponseConfig {
                    modalities,
                    instructions,
                },
            },
            OutboundCommand::InjectUserText { text } => ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(text),
            },
            OutboundCommand::AppendAudio { pcm } => ClientEvent::audio_append(&pcm),
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received from the realtime API.
///
/// Only the fields this client reads are declared; everything else in a
/// payload is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },

    #[serde(rename = "session.updated")]
    SessionUpdated,

    /// Speech started (VAD detected speech)
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Speech stopped (VAD detected silence)
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// Partial transcription of user audio
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    TranscriptionDelta { delta: String },

    /// Input audio transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },

    #[serde(rename = "response.started")]
    ResponseStarted,

    #[serde(rename = "response.created")]
    ResponseCreated,

    #[serde(rename = "response.audio_transcript.started")]
    AudioTranscriptStarted,

    /// Assistant transcript chunk
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },

    /// Assistant transcript complete. Some deployments omit the transcript.
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Audio delta (audio data chunk)
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        /// Base64-encoded audio delta
        delta: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone,

    /// Any event type this client does not act on
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode base64 audio from an AudioDelta event.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

/// API error information.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

/// Session information from `session.created`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionInfo {
    /// Session ID
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
}
