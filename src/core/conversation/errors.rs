use thiserror::Error;

use crate::core::realtime::RealtimeError;

/// Errors surfaced by [`super::ConversationController`].
#[derive(Debug, Error)]
pub enum ConversationError {
    /// `start()` called while a session is starting, active or stopping
    #[error("Conversation already active")]
    AlreadyActive,

    /// Control channel not open; the caller may retry later
    #[error("Control channel not ready")]
    ChannelNotReady,

    /// The session could not be brought up. The controller is back to idle.
    #[error("Failed to start conversation: {0}")]
    StartFailed(#[source] RealtimeError),
}

pub type ConversationResult<T> = Result<T, ConversationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_start_failed_keeps_source() {
        let err = ConversationError::StartFailed(RealtimeError::Timeout(
            "control channel did not open".to_string(),
        ));
        assert!(err.to_string().starts_with("Failed to start conversation"));
        let source = err.source().unwrap();
        assert!(source.to_string().contains("did not open"));
    }
}
