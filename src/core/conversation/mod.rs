//! Conversation layer.
//!
//! Sits on top of [`crate::core::realtime`] and turns the raw control-channel
//! stream into a tutoring conversation:
//!
//! - `EventRouter` maps inbound messages onto typed events
//! - `TranscriptCoalescer` merges partial transcripts into utterances
//! - `PersonaInstructionBuilder` renders a persona into model instructions
//! - `ConversationController` owns the session lifecycle

mod controller;
mod errors;
mod events;
mod persona;
mod router;
mod transcript;

pub use controller::{
    ControllerConfig, ControllerState, ConversationController, ConversationStatus,
    DEFAULT_CHANNEL_OPEN_INTERVAL, DEFAULT_CHANNEL_OPEN_MAX_ATTEMPTS, DEFAULT_SETTLE_DELAY,
    DEFAULT_SWITCH_DELAY, ErrorCallback, InterimCallback, TurnStateCallback, UtteranceCallback,
};
pub use errors::{ConversationError, ConversationResult};
pub use events::{ConversationEvent, EventKind, Speaker, TurnState, Utterance};
pub use persona::{
    CharacterSettings, DEFAULT_MAX_SENTENCES, DEFAULT_TARGET_LANGUAGE, Gender,
    PersonaInstructionBuilder,
};
pub use router::{EventHandler, EventRouter};
pub use transcript::{
    TranscriptBuffer, TranscriptCoalescer, TranscriptUpdate, normalize_transcript,
};
