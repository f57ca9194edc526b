//! Transcript coalescing.
//!
//! The remote side streams many overlapping partial transcripts per turn and
//! may redeliver final ones. [`TranscriptCoalescer`] turns that stream into
//! interim caption updates plus at most one finalized [`Utterance`] per turn
//! and speaker.
//!
//! De-duplication rule: a finalized transcript is emitted only if, after
//! normalization, it is non-empty and differs from the last text emitted for
//! the same speaker in the same turn. Repeating an answer in a later turn is
//! a new utterance.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use super::events::{ConversationEvent, Speaker, Utterance};

static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize a transcript for comparison and storage.
///
/// NFC normalization, control characters removed (line breaks and tabs become
/// spaces), whitespace runs collapsed to one space, trimmed.
pub fn normalize_transcript(text: &str) -> String {
    let cleaned: String = text
        .nfc()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if c.is_control() {
                None
            } else {
                Some(c)
            }
        })
        .collect();

    WHITESPACE_REGEX
        .replace_all(&cleaned, " ")
        .trim()
        .to_string()
}

/// Result of feeding one event to the coalescer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptUpdate {
    /// Running text for live captions. Never deduplicated.
    Interim { speaker: Speaker, text: String },
    /// A finalized utterance.
    Final(Utterance),
}

/// Per-speaker accumulation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptBuffer {
    pub speaker: Speaker,
    pub accumulated_partial: String,
    /// Last normalized text emitted as final
    pub last_emitted_final: String,
    /// Turn in which `last_emitted_final` was emitted; dedup only applies there
    pub last_emitted_at_turn: u64,
    pub turn: u64,
    /// A final was already seen for the current turn
    pub finalized: bool,
}

impl TranscriptBuffer {
    pub fn new(speaker: Speaker) -> Self {
        Self {
            speaker,
            accumulated_partial: String::new(),
            last_emitted_final: String::new(),
            last_emitted_at_turn: 0,
            turn: 0,
            finalized: false,
        }
    }

    /// Start a new turn. Dedup memory is kept.
    pub fn reset_turn(&mut self) {
        self.accumulated_partial.clear();
        self.finalized = false;
        self.turn += 1;
    }

    /// Apply the normalize+dedup rule to `text`.
    ///
    /// Marks the turn finalized and clears the partial whether or not an
    /// utterance comes out.
    pub fn finalize(&mut self, text: &str) -> Option<Utterance> {
        self.finalized = true;
        self.accumulated_partial.clear();

        let normalized = normalize_transcript(text);
        if normalized.is_empty() {
            tracing::trace!(speaker = %self.speaker, "Dropping empty final transcript");
            return None;
        }
        if normalized == self.last_emitted_final && self.last_emitted_at_turn == self.turn {
            tracing::debug!(speaker = %self.speaker, turn = self.turn, "Suppressing duplicate final transcript");
            return None;
        }

        self.last_emitted_final = normalized.clone();
        self.last_emitted_at_turn = self.turn;
        Some(Utterance {
            speaker: self.speaker,
            text: normalized,
            turn: self.turn,
        })
    }
}

/// Owns both speakers' buffers for one conversation.
#[derive(Debug, Clone, Default)]
pub struct TranscriptCoalescer {
    user: Option<TranscriptBuffer>,
    assistant: Option<TranscriptBuffer>,
}

impl TranscriptCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, speaker: Speaker) -> Option<&TranscriptBuffer> {
        match speaker {
            Speaker::User => self.user.as_ref(),
            Speaker::Assistant => self.assistant.as_ref(),
        }
    }

    fn buffer_mut(&mut self, speaker: Speaker) -> &mut TranscriptBuffer {
        let slot = match speaker {
            Speaker::User => &mut self.user,
            Speaker::Assistant => &mut self.assistant,
        };
        slot.get_or_insert_with(|| TranscriptBuffer::new(speaker))
    }

    /// Drop all buffers, including dedup memory.
    pub fn clear(&mut self) {
        self.user = None;
        self.assistant = None;
    }

    /// Feed one event. Returns the update to surface, if any.
    pub fn handle(&mut self, event: &ConversationEvent) -> Option<TranscriptUpdate> {
        match event {
            ConversationEvent::SpeechStarted => {
                self.buffer_mut(Speaker::User).reset_turn();
                None
            }
            ConversationEvent::ResponseStarted => {
                self.buffer_mut(Speaker::Assistant).reset_turn();
                None
            }
            ConversationEvent::SpeechStopped => None,

            ConversationEvent::UserTranscriptDelta { text } => {
                let buffer = self.buffer_mut(Speaker::User);
                if buffer.finalized {
                    return None;
                }
                // Some transcribers resend the whole running text, others only the tail.
                // A tail that happens to start with the running text ("a" then "and")
                // is taken as cumulative; the final transcript corrects the caption.
                if !buffer.accumulated_partial.is_empty()
                    && text.starts_with(buffer.accumulated_partial.as_str())
                {
                    buffer.accumulated_partial.clone_from(text);
                } else {
                    buffer.accumulated_partial.push_str(text);
                }
                Some(TranscriptUpdate::Interim {
                    speaker: Speaker::User,
                    text: buffer.accumulated_partial.clone(),
                })
            }
            ConversationEvent::UserTranscriptFinal { text } => self
                .buffer_mut(Speaker::User)
                .finalize(text)
                .map(TranscriptUpdate::Final),

            ConversationEvent::AssistantTranscriptDelta { text } => {
                let buffer = self.buffer_mut(Speaker::Assistant);
                if buffer.finalized {
                    return None;
                }
                buffer.accumulated_partial.push_str(text);
                Some(TranscriptUpdate::Interim {
                    speaker: Speaker::Assistant,
                    text: buffer.accumulated_partial.clone(),
                })
            }
            ConversationEvent::AssistantTranscriptFinal { text } => {
                let buffer = self.buffer_mut(Speaker::Assistant);
                let text = match text {
                    Some(text) if !text.trim().is_empty() => text.clone(),
                    _ => buffer.accumulated_partial.clone(),
                };
                buffer.finalize(&text).map(TranscriptUpdate::Final)
            }
            ConversationEvent::ResponseDone => {
                let buffer = self.buffer_mut(Speaker::Assistant);
                if buffer.accumulated_partial.is_empty() {
                    return None;
                }
                let pending = std::mem::take(&mut buffer.accumulated_partial);
                buffer.finalize(&pending).map(TranscriptUpdate::Final)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_delta(text: &str) -> ConversationEvent {
        ConversationEvent::UserTranscriptDelta {
            text: text.to_string(),
        }
    }

    fn user_final(text: &str) -> ConversationEvent {
        ConversationEvent::UserTranscriptFinal {
            text: text.to_string(),
        }
    }

    fn assistant_delta(text: &str) -> ConversationEvent {
        ConversationEvent::AssistantTranscriptDelta {
            text: text.to_string(),
        }
    }

    fn finals(updates: &[Option<TranscriptUpdate>]) -> Vec<Utterance> {
        updates
            .iter()
            .filter_map(|u| match u {
                Some(TranscriptUpdate::Final(utterance)) => Some(utterance.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_normalize_transcript() {
        assert_eq!(normalize_transcript("  hello   world \n"), "hello world");
        assert_eq!(normalize_transcript("a\u{0007}b\tc"), "ab c");
        // Decomposed e + combining acute becomes the precomposed form
        assert_eq!(normalize_transcript("caf\u{0065}\u{0301}"), "caf\u{00e9}");
        assert_eq!(normalize_transcript(" \u{0000} \n\t"), "");
    }

    #[test]
    fn test_spoken_turn_scenario() {
        let mut coalescer = TranscriptCoalescer::new();
        let events = [
            ConversationEvent::SpeechStarted,
            user_delta("he"),
            user_delta("hello"),
            ConversationEvent::SpeechStopped,
            user_final("hello"),
            user_final("hello"),
        ];
        let updates: Vec<_> = events.iter().map(|e| coalescer.handle(e)).collect();

        assert_eq!(
            updates[1],
            Some(TranscriptUpdate::Interim {
                speaker: Speaker::User,
                text: "he".to_string()
            })
        );
        assert_eq!(
            updates[2],
            Some(TranscriptUpdate::Interim {
                speaker: Speaker::User,
                text: "hello".to_string()
            })
        );

        let emitted = finals(&updates);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].text, "hello");
        assert_eq!(emitted[0].speaker, Speaker::User);
        assert_eq!(emitted[0].turn, 1);
    }

    #[test]
    fn test_back_to_back_equal_finals_emit_once() {
        let mut coalescer = TranscriptCoalescer::new();
        let updates: Vec<_> = ["Good morning", "Good  morning ", "good morning"]
            .iter()
            .map(|t| coalescer.handle(&user_final(t)))
            .collect();

        let emitted = finals(&updates);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].text, "Good morning");
        assert_eq!(emitted[1].text, "good morning");
    }

    #[test]
    fn test_repeated_answer_in_new_turn_is_emitted() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&ConversationEvent::SpeechStarted);
        assert!(coalescer.handle(&user_final("yes")).is_some());
        // Redelivery within the same turn
        assert!(coalescer.handle(&user_final("yes")).is_none());

        coalescer.handle(&ConversationEvent::SpeechStarted);
        let update = coalescer.handle(&user_final(" yes "));
        assert!(matches!(
            update,
            Some(TranscriptUpdate::Final(ref u)) if u.text == "yes" && u.turn == 2
        ));
        assert!(coalescer.handle(&user_final("yes")).is_none());

        let buffer = coalescer.buffer(Speaker::User).unwrap();
        assert_eq!(buffer.last_emitted_at_turn, 2);
        assert_eq!(buffer.turn, 2);
    }

    #[test]
    fn test_assistant_repeats_line_across_responses() {
        let mut coalescer = TranscriptCoalescer::new();
        let mut updates = Vec::new();
        for _ in 0..2 {
            updates.push(coalescer.handle(&ConversationEvent::ResponseStarted));
            updates.push(coalescer.handle(&ConversationEvent::AssistantTranscriptFinal {
                text: Some("Great!".to_string()),
            }));
            updates.push(coalescer.handle(&ConversationEvent::ResponseDone));
        }

        let emitted = finals(&updates);
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|u| u.text == "Great!"));
        assert_eq!(emitted[0].turn, 1);
        assert_eq!(emitted[1].turn, 2);
    }

    #[test]
    fn test_late_assistant_delta_after_final_is_ignored() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&ConversationEvent::ResponseStarted);
        coalescer.handle(&assistant_delta("Très bien."));
        assert!(coalescer
            .handle(&ConversationEvent::AssistantTranscriptFinal { text: None })
            .is_some());

        assert!(coalescer.handle(&assistant_delta(" Encore")).is_none());
        assert!(coalescer.handle(&ConversationEvent::ResponseDone).is_none());
        assert_eq!(
            coalescer
                .buffer(Speaker::Assistant)
                .unwrap()
                .accumulated_partial,
            ""
        );

        // The next response accumulates normally again
        coalescer.handle(&ConversationEvent::ResponseStarted);
        assert_eq!(
            coalescer.handle(&assistant_delta("Encore")),
            Some(TranscriptUpdate::Interim {
                speaker: Speaker::Assistant,
                text: "Encore".to_string()
            })
        );
    }

    #[test]
    fn test_tail_delta_starting_with_partial_replaces_it() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&ConversationEvent::SpeechStarted);
        coalescer.handle(&user_delta("a"));
        // Indistinguishable from a cumulative resend, so the caption becomes "and"
        assert_eq!(
            coalescer.handle(&user_delta("and")),
            Some(TranscriptUpdate::Interim {
                speaker: Speaker::User,
                text: "and".to_string()
            })
        );
        // A tail that does not extend the partial is appended
        assert_eq!(
            coalescer.handle(&user_delta(" then")),
            Some(TranscriptUpdate::Interim {
                speaker: Speaker::User,
                text: "and then".to_string()
            })
        );

        let update = coalescer.handle(&user_final("a and then"));
        assert!(matches!(
            update,
            Some(TranscriptUpdate::Final(ref u)) if u.text == "a and then"
        ));
    }

    #[test]
    fn test_speech_started_clears_leftover_partial() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&user_delta("left over"));
        coalescer.handle(&ConversationEvent::SpeechStarted);
        assert_eq!(
            coalescer.buffer(Speaker::User).unwrap().accumulated_partial,
            ""
        );

        let update = coalescer.handle(&user_delta("new"));
        assert_eq!(
            update,
            Some(TranscriptUpdate::Interim {
                speaker: Speaker::User,
                text: "new".to_string()
            })
        );
    }

    #[test]
    fn test_delta_after_final_is_ignored_until_next_turn() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&ConversationEvent::SpeechStarted);
        coalescer.handle(&user_final("done"));
        assert!(coalescer.handle(&user_delta("late")).is_none());

        coalescer.handle(&ConversationEvent::SpeechStarted);
        assert!(coalescer.handle(&user_delta("fresh")).is_some());
    }

    #[test]
    fn test_empty_final_is_not_an_utterance() {
        let mut coalescer = TranscriptCoalescer::new();
        assert!(coalescer.handle(&user_final("  \n ")).is_none());
        assert_eq!(
            coalescer.buffer(Speaker::User).unwrap().last_emitted_final,
            ""
        );
    }

    #[test]
    fn test_assistant_deltas_concatenate_until_done() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&ConversationEvent::ResponseStarted);
        coalescer.handle(&assistant_delta("Bon"));
        let interim = coalescer.handle(&assistant_delta("jour !"));
        assert_eq!(
            interim,
            Some(TranscriptUpdate::Interim {
                speaker: Speaker::Assistant,
                text: "Bonjour !".to_string()
            })
        );

        let update = coalescer.handle(&ConversationEvent::AssistantTranscriptFinal { text: None });
        match update {
            Some(TranscriptUpdate::Final(utterance)) => {
                assert_eq!(utterance.speaker, Speaker::Assistant);
                assert_eq!(utterance.text, "Bonjour !");
            }
            other => panic!("expected final, got {other:?}"),
        }

        // The trailing done signal must not emit again
        assert!(coalescer.handle(&ConversationEvent::ResponseDone).is_none());
        assert_eq!(
            coalescer
                .buffer(Speaker::Assistant)
                .unwrap()
                .accumulated_partial,
            ""
        );
    }

    #[test]
    fn test_assistant_final_prefers_provided_transcript() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&ConversationEvent::ResponseStarted);
        coalescer.handle(&assistant_delta("Hel"));
        let update = coalescer.handle(&ConversationEvent::AssistantTranscriptFinal {
            text: Some("Hello there.".to_string()),
        });
        assert!(matches!(
            update,
            Some(TranscriptUpdate::Final(ref u)) if u.text == "Hello there."
        ));
    }

    #[test]
    fn test_response_done_flushes_pending_partial() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&ConversationEvent::ResponseStarted);
        coalescer.handle(&assistant_delta("How are you?"));
        let update = coalescer.handle(&ConversationEvent::ResponseDone);
        assert!(matches!(
            update,
            Some(TranscriptUpdate::Final(ref u)) if u.text == "How are you?"
        ));
        assert!(coalescer.handle(&ConversationEvent::ResponseDone).is_none());
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut coalescer = TranscriptCoalescer::new();
        coalescer.handle(&user_final("hello"));
        coalescer.clear();
        assert!(coalescer.buffer(Speaker::User).is_none());
        assert!(coalescer.handle(&user_final("hello")).is_some());
    }
}
