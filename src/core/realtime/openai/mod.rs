//! WebSocket realtime transport for the tutor's voice sessions.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian at 24kHz.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voice_tutor::core::realtime::{
//!     NullCaptureDevice, NullSink, OpenParams, OpenAIRealtimeTransport, RealtimeTransport,
//!     RealtimeTransportConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut transport = OpenAIRealtimeTransport::new(
//!         RealtimeTransportConfig::default(),
//!         Arc::new(NullCaptureDevice),
//!     );
//!     let session = transport
//!         .open(OpenParams {
//!             token: "ek_...".to_string(),
//!             model_id: "gpt-4o-realtime-preview".to_string(),
//!             voice_id: "alloy".to_string(),
//!             audio_constraints: Default::default(),
//!             sink: Arc::new(NullSink),
//!         })
//!         .await
//!         .unwrap();
//!
//!     let mut inbound = transport.take_inbound().unwrap();
//!     while let Some(raw) = inbound.recv().await {
//!         println!("{raw}");
//!     }
//! }
//! ```

mod config;
mod messages;
mod transport;

pub use config::{
    DEFAULT_OUTBOUND_CAPACITY, DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_SAMPLE_RATE,
    OPENAI_REALTIME_URL, OpenAIRealtimeVoice, RealtimeTransportConfig,
};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, ResponseConfig, ServerEvent, SessionConfig,
    TurnDetection,
};
pub use transport::{OpenAIRealtimeTransport, OpenAITransportFactory};
