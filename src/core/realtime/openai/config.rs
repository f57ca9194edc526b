//! Realtime transport configuration types.
//!
//! This module contains configuration for the WebSocket transport:
//! - Endpoint and model defaults
//! - Voice catalogue
//! - Queue sizing and input transcription

use serde::{Deserialize, Serialize};

/// Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Model used when the token backend does not name one.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Default audio sample rate for the realtime API.
pub const OPENAI_REALTIME_SAMPLE_RATE: u32 = 24000;

/// Default capacity of the outbound command queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// Voices
// =============================================================================

/// Voices accepted by the realtime model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIRealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse a voice id. Returns `None` for voices the model does not know.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
    }

    /// Get all available voices.
    pub fn all() -> &'static [OpenAIRealtimeVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Coral,
            Self::Echo,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Settings for [`super::OpenAIRealtimeTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeTransportConfig {
    /// WebSocket base URL; `?model=` is appended on connect
    pub url: String,
    /// Capacity of the bounded outbound command queue
    pub outbound_capacity: usize,
    /// Model for transcribing user audio; omitted from `session.update` when `None`
    pub transcription_model: Option<String>,
}

impl Default for RealtimeTransportConfig {
    fn default() -> Self {
        Self {
            url: OPENAI_REALTIME_URL.to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            transcription_model: Some("whisper-1".to_string()),
        }
    }
}

impl RealtimeTransportConfig {
    /// Full connect URL for a model.
    pub fn connect_url(&self, model_id: &str) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}model={}", self.url, separator, model_id)
    }
}
