//! Realtime transport module.
//!
//! Everything needed to hold one low-latency audio + control channel open
//! against the remote conversational model:
//!
//! - `RealtimeTransport` trait and its WebSocket implementation
//! - `TokenProvider` for ephemeral session credentials
//! - Capture device and audio sink collaborators
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian, mono, 24kHz in both directions.

mod audio;
mod base;
pub mod openai;
mod token;

pub use audio::{ChannelCaptureDevice, NullCaptureDevice, NullSink, WavFileSink};
pub use base::{
    AudioConstraints, AudioSink, BoxedTransport, CaptureDevice, ChannelState, Modality,
    OpenParams, OutboundCommand, RealtimeAudioData, RealtimeError, RealtimeResult,
    RealtimeTransport, Session, SessionState, TransportErrorCallback, TransportFactory,
    TurnDetectionConfig,
};
pub use openai::{
    DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL,
    OpenAIRealtimeTransport, OpenAIRealtimeVoice, OpenAITransportFactory,
    RealtimeTransportConfig,
};
pub use token::{HttpTokenProvider, SessionToken, StaticTokenProvider, TokenProvider};
