//! Conversation-level event and turn types.

use std::fmt;

/// The closed set of events the conversation layer reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    SpeechStarted,
    SpeechStopped,
    ResponseStarted,
    ResponseDone,
    UserTranscriptDelta { text: String },
    UserTranscriptFinal { text: String },
    AssistantTranscriptDelta { text: String },
    /// `None` when the remote side signalled completion without a transcript
    AssistantTranscriptFinal { text: Option<String> },
}

impl ConversationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SpeechStarted => EventKind::SpeechStarted,
            Self::SpeechStopped => EventKind::SpeechStopped,
            Self::ResponseStarted => EventKind::ResponseStarted,
            Self::ResponseDone => EventKind::ResponseDone,
            Self::UserTranscriptDelta { .. } => EventKind::UserTranscriptDelta,
            Self::UserTranscriptFinal { .. } => EventKind::UserTranscriptFinal,
            Self::AssistantTranscriptDelta { .. } => EventKind::AssistantTranscriptDelta,
            Self::AssistantTranscriptFinal { .. } => EventKind::AssistantTranscriptFinal,
        }
    }
}

/// Discriminant of [`ConversationEvent`], one handler slot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SpeechStarted,
    SpeechStopped,
    ResponseStarted,
    ResponseDone,
    UserTranscriptDelta,
    UserTranscriptFinal,
    AssistantTranscriptDelta,
    AssistantTranscriptFinal,
}

impl EventKind {
    pub const COUNT: usize = 8;

    pub const ALL: [EventKind; Self::COUNT] = [
        EventKind::SpeechStarted,
        EventKind::SpeechStopped,
        EventKind::ResponseStarted,
        EventKind::ResponseDone,
        EventKind::UserTranscriptDelta,
        EventKind::UserTranscriptFinal,
        EventKind::AssistantTranscriptDelta,
        EventKind::AssistantTranscriptFinal,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// One finalized, deduplicated turn by one speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
    /// Turn counter of the speaker's buffer when the utterance was finalized
    pub turn: u64,
}

/// Live flags of an active conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnState {
    /// The remote VAD hears the user speaking
    pub listening: bool,
    /// The assistant is producing a response
    pub responding: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_are_distinct() {
        let mut seen = [false; EventKind::COUNT];
        for kind in EventKind::ALL {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_event_kind() {
        let event = ConversationEvent::UserTranscriptFinal {
            text: "hello".to_string(),
        };
        assert_eq!(event.kind(), EventKind::UserTranscriptFinal);
        assert_eq!(Speaker::Assistant.to_string(), "assistant");
    }
}
