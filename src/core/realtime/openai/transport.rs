//! WebSocket realtime transport.
//!
//! Owns one audio + control channel to the realtime model:
//!
//! - Endpoint: `<realtime_url>?model=<model>`
//! - Auth: `Authorization: Bearer <ephemeral token>`, `OpenAI-Beta: realtime=v1`
//! - Audio: PCM 16-bit, 24kHz, mono, little-endian, base64 encoded
//!
//! Remote audio (`response.audio.delta`) goes straight to the session's
//! [`AudioSink`]. Every other text frame is forwarded verbatim and in order on
//! the inbound channel returned by [`RealtimeTransport::take_inbound`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::header::{AUTHORIZATION, HeaderValue};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::sync::CancellationToken;

use super::config::{OPENAI_REALTIME_SAMPLE_RATE, RealtimeTransportConfig};
use super::messages::{ClientEvent, ServerEvent};
use crate::core::realtime::base::{
    AudioSink, BoxedTransport, CaptureDevice, ChannelState, OpenParams, OutboundCommand,
    RealtimeAudioData, RealtimeError, RealtimeResult, RealtimeTransport, Session, SessionState,
    TransportErrorCallback, TransportFactory,
};

/// How long `close()` waits for the I/O task to send its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Transport
// =============================================================================

/// Realtime transport over a WebSocket control channel.
///
/// # Thread Safety
///
/// State shared with the spawned I/O task lives behind `Arc` wrappers. All
/// locks are `parking_lot` and are never held across an await point.
pub struct OpenAIRealtimeTransport {
    config: RealtimeTransportConfig,
    capture: Arc<dyn CaptureDevice>,

    channel_state: Arc<RwLock<ChannelState>>,
    session: Arc<RwLock<Option<Session>>>,

    /// Outbound queue into the I/O task
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientEvent>>>>,
    inbound_rx: Option<mpsc::UnboundedReceiver<String>>,
    error_callback: Arc<RwLock<Option<TransportErrorCallback>>>,

    cancel: Option<CancellationToken>,
    connection_handle: Option<JoinHandle<()>>,
}

impl OpenAIRealtimeTransport {
    pub fn new(config: RealtimeTransportConfig, capture: Arc<dyn CaptureDevice>) -> Self {
        Self {
            config,
            capture,
            channel_state: Arc::new(RwLock::new(ChannelState::Closed)),
            session: Arc::new(RwLock::new(None)),
            ws_sender: Arc::new(Mutex::new(None)),
            inbound_rx: None,
            error_callback: Arc::new(RwLock::new(None)),
            cancel: None,
            connection_handle: None,
        }
    }

    fn set_closed(&self) {
        *self.channel_state.write() = ChannelState::Closed;
        if let Some(session) = self.session.write().as_mut() {
            session.state = SessionState::Closed;
        }
    }

    /// Undo a half-finished `open()`.
    fn abort_open(&self, reason: String) -> RealtimeError {
        self.capture.release();
        self.set_closed();
        RealtimeError::ConnectionFailed(reason)
    }

    /// Handle one inbound text frame inside the I/O task.
    ///
    /// Returns `false` once the router side has gone away.
    fn handle_text(
        text: &str,
        sink: &Arc<dyn AudioSink>,
        inbound_tx: &mpsc::UnboundedSender<String>,
        session: &Arc<RwLock<Option<Session>>>,
        error_cb: &Arc<RwLock<Option<TransportErrorCallback>>>,
    ) -> bool {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(ServerEvent::AudioDelta {
                delta,
                item_id,
                response_id,
            }) => {
                match ServerEvent::decode_audio_delta(&delta) {
                    Ok(audio_bytes) => sink.write(RealtimeAudioData {
                        data: Bytes::from(audio_bytes),
                        sample_rate: OPENAI_REALTIME_SAMPLE_RATE,
                        item_id,
                        response_id,
                    }),
                    Err(e) => tracing::error!("Failed to decode audio delta: {}", e),
                }
                return true;
            }
            Ok(ServerEvent::SessionCreated { session: info }) => {
                tracing::info!(provider_session_id = %info.id, "Realtime session created");
                if let Some(session) = session.write().as_mut() {
                    session.provider_session_id = Some(info.id);
                }
            }
            Ok(ServerEvent::Error { error }) => {
                tracing::warn!(
                    "Realtime provider error: {} - {}",
                    error.error_type,
                    error.message
                );
                let callback = error_cb.read().clone();
                if let Some(cb) = callback {
                    cb(RealtimeError::ProviderError(format!(
                        "{}: {}",
                        error.error_type, error.message
                    )));
                }
            }
            _ => {}
        }

        inbound_tx.send(text.to_string()).is_ok()
    }
}

#[async_trait]
impl RealtimeTransport for OpenAIRealtimeTransport {
    async fn open(&mut self, params: OpenParams) -> RealtimeResult<Session> {
        if self.connection_handle.is_some() {
            self.close().await;
        }

        if params.token.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "ephemeral token is empty".to_string(),
            ));
        }

        *self.channel_state.write() = ChannelState::Connecting;

        // Constraints are applied by the device itself; failure is fatal
        let mut capture_rx = match self.capture.acquire(&params.audio_constraints).await {
            Ok(rx) => rx,
            Err(e) => {
                self.set_closed();
                return Err(match e {
                    RealtimeError::ConnectionFailed(msg) => RealtimeError::ConnectionFailed(msg),
                    other => RealtimeError::ConnectionFailed(format!(
                        "capture device unavailable: {other}"
                    )),
                });
            }
        };

        let url = self.config.connect_url(&params.model_id);

        let mut request = match url.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => return Err(self.abort_open(format!("invalid realtime url {url}: {e}"))),
        };
        let bearer = match HeaderValue::from_str(&format!("Bearer {}", params.token)) {
            Ok(value) => value,
            Err(e) => return Err(self.abort_open(format!("invalid token header: {e}"))),
        };
        request.headers_mut().insert(AUTHORIZATION, bearer);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(connected) => connected,
            Err(e) => return Err(self.abort_open(e.to_string())),
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            session_id = %session_id,
            model = %params.model_id,
            voice = %params.voice_id,
            "Connected to realtime API"
        );

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientEvent>(self.config.outbound_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        *self.ws_sender.lock() = Some(tx);
        self.inbound_rx = Some(inbound_rx);

        let session = Session {
            id: session_id,
            state: SessionState::Open,
            control_channel_state: ChannelState::Connecting,
            sink: params.sink.clone(),
            model_id: params.model_id.clone(),
            voice_id: params.voice_id.clone(),
            provider_session_id: None,
        };
        *self.session.write() = Some(session.clone());

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let channel_state = self.channel_state.clone();
        let session_slot = self.session.clone();
        let ws_sender = self.ws_sender.clone();
        let error_cb = self.error_callback.clone();
        let capture = self.capture.clone();
        let sink = params.sink;

        let handle = tokio::spawn(async move {
            {
                let mut state = channel_state.write();
                if *state == ChannelState::Connecting {
                    *state = ChannelState::Open;
                }
            }

            let mut capture_open = true;
            let mut lost = false;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Err(e) = ws_sink.send(Message::Close(None)).await {
                            tracing::debug!("Failed to send close frame: {}", e);
                        }
                        break;
                    }

                    // Handle outgoing commands
                    Some(event) = rx.recv() => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            lost = true;
                            break;
                        }
                    }

                    // Stream captured audio
                    frame = capture_rx.recv(), if capture_open => {
                        match frame {
                            Some(pcm) => {
                                let json = match serde_json::to_string(&ClientEvent::audio_append(&pcm)) {
                                    Ok(j) => j,
                                    Err(e) => {
                                        tracing::error!("Failed to serialize audio: {}", e);
                                        continue;
                                    }
                                };
                                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                    tracing::error!("Failed to send audio frame: {}", e);
                                    lost = true;
                                    break;
                                }
                            }
                            None => {
                                tracing::debug!("Capture stream ended");
                                capture_open = false;
                            }
                        }
                    }

                    // Handle incoming messages
                    msg = ws_stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if !Self::handle_text(text.as_str(), &sink, &inbound_tx, &session_slot, &error_cb) {
                                    tracing::trace!("Inbound receiver dropped");
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!("WebSocket closed by server");
                                lost = true;
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                lost = true;
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }

            *ws_sender.lock() = None;
            *channel_state.write() = ChannelState::Closed;
            if let Some(session) = session_slot.write().as_mut() {
                session.state = SessionState::Closed;
            }

            if lost && !cancel.is_cancelled() {
                capture.release();
                let callback = error_cb.read().clone();
                if let Some(cb) = callback {
                    cb(RealtimeError::ConnectionFailed(
                        "control channel closed unexpectedly".to_string(),
                    ));
                }
            }

            tracing::info!("Realtime connection task ended");
        });

        self.connection_handle = Some(handle);
        Ok(session)
    }

    fn send(&self, command: OutboundCommand) -> RealtimeResult<()> {
        if *self.channel_state.read() != ChannelState::Open {
            return Err(RealtimeError::ChannelNotReady);
        }

        let name = command.name();
        let voice = self.session.read().as_ref().map(|s| s.voice_id.clone());
        let event = ClientEvent::from_command(
            command,
            voice.as_deref(),
            self.config.transcription_model.as_deref(),
        );

        let guard = self.ws_sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(RealtimeError::ChannelNotReady);
        };

        match sender.try_send(event) {
            Ok(()) => {
                tracing::debug!(command = name, "Queued outbound command");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(command = name, "Outbound queue full, dropping command");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RealtimeError::ChannelNotReady),
        }
    }

    async fn close(&mut self) {
        let Some(handle) = self.connection_handle.take() else {
            // Never opened, or already closed
            self.capture.release();
            self.set_closed();
            return;
        };

        *self.channel_state.write() = ChannelState::Closing;
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        *self.ws_sender.lock() = None;

        let abort = handle.abort_handle();
        if tokio::time::timeout(CLOSE_GRACE, handle).await.is_err() {
            tracing::warn!("Realtime connection task did not stop in time, aborting");
            abort.abort();
        }

        self.capture.release();
        let sink = self.session.read().as_ref().map(|s| s.sink.clone());
        if let Some(sink) = sink {
            sink.clear();
        }
        self.set_closed();
        self.inbound_rx = None;

        tracing::info!("Disconnected from realtime API");
    }

    fn channel_state(&self) -> ChannelState {
        *self.channel_state.read()
    }

    fn session(&self) -> Option<Session> {
        let channel_state = self.channel_state();
        self.session.read().clone().map(|mut session| {
            session.control_channel_state = channel_state;
            session
        })
    }

    fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.inbound_rx.take()
    }

    fn on_error(&mut self, callback: TransportErrorCallback) {
        *self.error_callback.write() = Some(callback);
    }
}

impl Drop for OpenAIRealtimeTransport {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds a fresh [`OpenAIRealtimeTransport`] for every session.
pub struct OpenAITransportFactory {
    config: RealtimeTransportConfig,
    capture: Arc<dyn CaptureDevice>,
}

impl OpenAITransportFactory {
    pub fn new(config: RealtimeTransportConfig, capture: Arc<dyn CaptureDevice>) -> Self {
        Self { config, capture }
    }
}

impl TransportFactory for OpenAITransportFactory {
    fn create(&self) -> BoxedTransport {
        Box::new(OpenAIRealtimeTransport::new(
            self.config.clone(),
            self.capture.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::audio::{NullCaptureDevice, NullSink};
    use crate::core::realtime::base::{AudioConstraints, TurnDetectionConfig};

    struct BrokenMicrophone;

    #[async_trait]
    impl CaptureDevice for BrokenMicrophone {
        async fn acquire(
            &self,
            _constraints: &AudioConstraints,
        ) -> RealtimeResult<mpsc::Receiver<Bytes>> {
            Err(RealtimeError::ConnectionFailed("permission denied".to_string()))
        }

        fn release(&self) {}
    }

    fn params(token: &str) -> OpenParams {
        OpenParams {
            token: token.to_string(),
            model_id: "gpt-4o-realtime-preview".to_string(),
            voice_id: "alloy".to_string(),
            audio_constraints: AudioConstraints::default(),
            sink: Arc::new(NullSink),
        }
    }

    #[test]
    fn test_send_before_open_is_channel_not_ready() {
        let transport = OpenAIRealtimeTransport::new(
            RealtimeTransportConfig::default(),
            Arc::new(NullCaptureDevice),
        );
        let result = transport.send(OutboundCommand::SessionConfigure {
            instructions: "x".to_string(),
            turn_detection: TurnDetectionConfig::default(),
        });
        assert!(matches!(result, Err(RealtimeError::ChannelNotReady)));
        assert_eq!(transport.channel_state(), ChannelState::Closed);
        assert!(transport.session().is_none());
    }

    #[tokio::test]
    async fn test_close_without_open_is_safe() {
        let mut transport = OpenAIRealtimeTransport::new(
            RealtimeTransportConfig::default(),
            Arc::new(NullCaptureDevice),
        );
        transport.close().await;
        transport.close().await;
        assert_eq!(transport.channel_state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_capture_failure_is_connection_error() {
        let mut transport = OpenAIRealtimeTransport::new(
            RealtimeTransportConfig::default(),
            Arc::new(BrokenMicrophone),
        );
        let result = transport.open(params("ek_123")).await;
        match result {
            Err(RealtimeError::ConnectionFailed(msg)) => assert!(msg.contains("permission")),
            other => panic!("expected ConnectionFailed, got {other:?}"),
        }
        assert_eq!(transport.channel_state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected() {
        let mut transport = OpenAIRealtimeTransport::new(
            RealtimeTransportConfig::default(),
            Arc::new(NullCaptureDevice),
        );
        let result = transport.open(params("")).await;
        assert!(matches!(result, Err(RealtimeError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let config = RealtimeTransportConfig {
            url: "ws://127.0.0.1:1/realtime".to_string(),
            ..Default::default()
        };
        let mut transport = OpenAIRealtimeTransport::new(config, Arc::new(NullCaptureDevice));
        let result = transport.open(params("ek_123")).await;
        assert!(matches!(result, Err(RealtimeError::ConnectionFailed(_))));
        assert_eq!(transport.channel_state(), ChannelState::Closed);
    }

    #[test]
    fn test_factory_creates_closed_transports() {
        let factory = OpenAITransportFactory::new(
            RealtimeTransportConfig::default(),
            Arc::new(NullCaptureDevice),
        );
        let transport = factory.create();
        assert_eq!(transport.channel_state(), ChannelState::Closed);
    }
}
