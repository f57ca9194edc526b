//! Base traits and types for the realtime transport.
//!
//! This module defines the foundational abstractions for the low-latency
//! bidirectional audio + control channel that carries one conversation
//! session with the remote model.
//!
//! # Audio Format
//!
//! Captured and played audio is PCM 16-bit signed little-endian, mono, 24kHz.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime transport operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Capture device or channel negotiation failed. Fatal to the attempt.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The ephemeral token could not be obtained
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A command was sent while the control channel was not open
    #[error("Control channel not ready")]
    ChannelNotReady,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Error event reported by the remote model
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Bounded wait exhausted
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Constraints applied to the capture device before negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Number of capture channels (mono = 1)
    pub channel_count: u16,
    /// Capture sample rate in Hz
    pub sample_rate: u32,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            channel_count: 1,
            sample_rate: 24000,
        }
    }
}

/// Server-side VAD parameters sent with every session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnDetectionConfig {
    /// Activation threshold (0.0 to 1.0)
    pub threshold: f32,
    /// Amount of audio to include before voice detection (ms)
    pub prefix_padding_ms: u32,
    /// Silence duration before end of turn (ms)
    pub silence_duration_ms: u32,
    /// Whether the server creates a response on turn end
    pub create_response: bool,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
            create_response: true,
        }
    }
}

/// Output modalities for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Text output
    Text,
    /// Audio output
    Audio,
}

impl Modality {
    /// Text and audio, in the order the remote model expects.
    pub fn text_and_audio() -> Vec<Modality> {
        vec![Modality::Text, Modality::Audio]
    }

    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }
}

// =============================================================================
// Outbound Commands
// =============================================================================

/// The closed set of messages a session may send over the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    /// Configure the session with persona instructions and turn detection
    SessionConfigure {
        instructions: String,
        turn_detection: TurnDetectionConfig,
    },
    /// Ask the model to produce a response
    CreateResponse {
        instructions: String,
        modalities: Vec<Modality>,
    },
    /// Inject a typed user message into the conversation
    InjectUserText { text: String },
    /// Stream captured microphone audio. Only the transport emits this.
    AppendAudio { pcm: Bytes },
}

impl OutboundCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionConfigure { .. } => "session.update",
            Self::CreateResponse { .. } => "response.create",
            Self::InjectUserText { .. } => "conversation.item.create",
            Self::AppendAudio { .. } => "input_audio_buffer.append",
        }
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Negotiation in progress
    #[default]
    Connecting,
    /// Negotiated and running
    Open,
    /// Torn down
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Open => write!(f, "Open"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// State of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Handshake in progress
    Connecting,
    /// Ready to carry commands
    Open,
    /// Close requested, I/O task draining
    Closing,
    /// Not connected
    #[default]
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Connecting => write!(f, "Connecting"),
            ChannelState::Open => write!(f, "Open"),
            ChannelState::Closing => write!(f, "Closing"),
            ChannelState::Closed => write!(f, "Closed"),
        }
    }
}

/// Snapshot of one transport session.
#[derive(Clone)]
pub struct Session {
    /// Locally generated session id
    pub id: String,
    pub state: SessionState,
    pub control_channel_state: ChannelState,
    /// Where remote audio is played
    pub sink: Arc<dyn AudioSink>,
    pub model_id: String,
    pub voice_id: String,
    /// Id reported by the remote side in `session.created`
    pub provider_session_id: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("control_channel_state", &self.control_channel_state)
            .field("model_id", &self.model_id)
            .field("voice_id", &self.voice_id)
            .field("provider_session_id", &self.provider_session_id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Audio Collaborators
// =============================================================================

/// Audio data produced by the remote party.
#[derive(Debug, Clone)]
pub struct RealtimeAudioData {
    /// Raw audio bytes (PCM 16-bit, 24kHz, mono, little-endian)
    pub data: Bytes,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Item ID from the provider
    pub item_id: Option<String>,
    /// Response ID from the provider
    pub response_id: Option<String>,
}

/// Output element that plays remote audio.
///
/// `write` is called from the transport I/O task for every audio chunk and
/// must not block.
pub trait AudioSink: Send + Sync {
    /// Queue a chunk for playback.
    fn write(&self, audio: RealtimeAudioData);

    /// Drop anything queued but not yet played.
    fn clear(&self) {}
}

/// Microphone-like capture device.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device with the given constraints applied.
    ///
    /// Returns a stream of PCM frames. An error here is fatal to the
    /// connection attempt.
    async fn acquire(&self, constraints: &AudioConstraints) -> RealtimeResult<mpsc::Receiver<Bytes>>;

    /// Release the device. Must be safe to call when not acquired.
    fn release(&self);
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Callback type for errors surfaced by the transport (provider error
/// events, unexpected channel loss).
pub type TransportErrorCallback = Arc<dyn Fn(RealtimeError) + Send + Sync>;

/// Everything needed to negotiate one session.
#[derive(Clone)]
pub struct OpenParams {
    /// Ephemeral token from the token provider
    pub token: String,
    pub model_id: String,
    pub voice_id: String,
    pub audio_constraints: AudioConstraints,
    pub sink: Arc<dyn AudioSink>,
}

/// A transport that owns one audio + control channel.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Acquire capture, negotiate the channel and start streaming.
    async fn open(&mut self, params: OpenParams) -> RealtimeResult<Session>;

    /// Send a command. Fails with `ChannelNotReady` unless the channel is open.
    fn send(&self, command: OutboundCommand) -> RealtimeResult<()>;

    /// Tear the session down. Idempotent.
    async fn close(&mut self);

    /// Current control channel state.
    fn channel_state(&self) -> ChannelState;

    /// Snapshot of the current session, if one was opened.
    fn session(&self) -> Option<Session>;

    /// Take the receiver of inbound control messages (raw JSON, arrival order).
    fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<String>>;

    /// Register a callback for transport-level errors.
    fn on_error(&mut self, callback: TransportErrorCallback);
}

/// Boxed trait object for transports.
pub type BoxedTransport = Box<dyn RealtimeTransport>;

/// Creates a fresh transport for every session.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> BoxedTransport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_state_display() {
        assert_eq!(ChannelState::Open.to_string(), "Open");
        assert_eq!(ChannelState::Closing.to_string(), "Closing");
        assert_eq!(ChannelState::default(), ChannelState::Closed);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Connecting.to_string(), "Connecting");
        assert_eq!(SessionState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_default_audio_constraints_are_mono_with_processing() {
        let constraints = AudioConstraints::default();
        assert!(constraints.echo_cancellation);
        assert!(constraints.noise_suppression);
        assert!(constraints.auto_gain_control);
        assert_eq!(constraints.channel_count, 1);
    }

    #[test]
    fn test_default_turn_detection() {
        let td = TurnDetectionConfig::default();
        assert_eq!(td.threshold, 0.5);
        assert_eq!(td.prefix_padding_ms, 300);
        assert_eq!(td.silence_duration_ms, 500);
        assert!(td.create_response);
    }

    #[test]
    fn test_error_display() {
        let err = RealtimeError::ConnectionFailed("no microphone".to_string());
        assert!(err.to_string().contains("Connection failed"));

        assert_eq!(
            RealtimeError::ChannelNotReady.to_string(),
            "Control channel not ready"
        );
    }

    #[test]
    fn test_command_names() {
        let cmd = OutboundCommand::InjectUserText {
            text: "hi".to_string(),
        };
        assert_eq!(cmd.name(), "conversation.item.create");
        assert_eq!(Modality::text_and_audio().len(), 2);
    }
}
