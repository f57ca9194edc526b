pub mod conversation;
pub mod realtime;

// Re-export commonly used types for convenience
pub use conversation::{
    CharacterSettings, ControllerConfig, ControllerState, ConversationController,
    ConversationError, ConversationEvent, ConversationResult, ConversationStatus, EventKind,
    EventRouter, Gender, PersonaInstructionBuilder, Speaker, TranscriptCoalescer, TurnState,
    Utterance,
};

pub use realtime::{
    AudioConstraints, AudioSink, BoxedTransport, CaptureDevice, ChannelState, HttpTokenProvider,
    OpenAITransportFactory, RealtimeError, RealtimeResult, RealtimeTransport,
    RealtimeTransportConfig, Session, SessionToken, StaticTokenProvider, TokenProvider,
    TransportFactory,
};
