//! Inbound control-message routing.
//!
//! Raw JSON from the control channel is mapped onto [`ConversationEvent`]s and
//! handed to the handler registered for that event kind. Dispatch is
//! synchronous and strictly in arrival order. Messages this client does not
//! understand are dropped without error so the remote protocol can grow new
//! event types.

use std::sync::Arc;

use super::events::{ConversationEvent, EventKind};
use crate::core::realtime::openai::ServerEvent;

/// Handler for one event kind. Must not block.
pub type EventHandler = Arc<dyn Fn(&ConversationEvent) + Send + Sync>;

/// Typed handler table with one slot per [`EventKind`].
#[derive(Clone, Default)]
pub struct EventRouter {
    handlers: [Option<EventHandler>; EventKind::COUNT],
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn on(&mut self, kind: EventKind, handler: EventHandler) -> &mut Self {
        self.handlers[kind.index()] = Some(handler);
        self
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers[kind.index()].is_some()
    }

    /// Translate one raw message into zero or more events, in the order they
    /// must be dispatched.
    pub fn parse(raw: &str) -> Vec<ConversationEvent> {
        let event = match serde_json::from_str::<ServerEvent>(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::trace!("Dropping malformed control message: {}", e);
                return Vec::new();
            }
        };

        match event {
            ServerEvent::SpeechStarted => vec![ConversationEvent::SpeechStarted],
            ServerEvent::SpeechStopped => vec![ConversationEvent::SpeechStopped],
            ServerEvent::ResponseStarted
            | ServerEvent::ResponseCreated
            | ServerEvent::AudioTranscriptStarted => vec![ConversationEvent::ResponseStarted],
            ServerEvent::ResponseDone => vec![ConversationEvent::ResponseDone],
            ServerEvent::AudioTranscriptDone { transcript } => vec![
                ConversationEvent::AssistantTranscriptFinal { text: transcript },
                ConversationEvent::ResponseDone,
            ],
            ServerEvent::AudioTranscriptDelta { delta } => {
                vec![ConversationEvent::AssistantTranscriptDelta { text: delta }]
            }
            ServerEvent::TranscriptionDelta { delta } => {
                vec![ConversationEvent::UserTranscriptDelta { text: delta }]
            }
            ServerEvent::TranscriptionCompleted { transcript } => {
                vec![ConversationEvent::UserTranscriptFinal { text: transcript }]
            }
            other => {
                tracing::trace!(event = ?other, "Ignoring control message");
                Vec::new()
            }
        }
    }

    /// Call the handler for a single event, if one is registered.
    pub fn dispatch_event(&self, event: &ConversationEvent) {
        if let Some(handler) = &self.handlers[event.kind().index()] {
            handler(event);
        }
    }

    /// Parse and dispatch one raw message. Returns the number of events produced.
    pub fn dispatch(&self, raw: &str) -> usize {
        let events = Self::parse(raw);
        for event in &events {
            self.dispatch_event(event);
        }
        events.len()
    }
}
