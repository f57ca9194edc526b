//! Conversation controller.
//!
//! Public entry point for a voice conversation: start and stop a session,
//! switch persona, send typed text and trigger the persona's opening line.
//!
//! # State machine
//!
//! ```text
//! Idle -> Starting -> Active -> Stopping -> Idle
//! ```
//!
//! `Active` carries two independent flags: `listening` (driven by speech
//! start/stop) and `responding` (driven by response start/done).
//!
//! Every started session gets a generation number. `stop()` and every
//! `start()` bump it, so events and continuations belonging to a superseded
//! session are recognised and dropped.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::errors::{ConversationError, ConversationResult};
use super::events::{ConversationEvent, EventKind, Speaker, TurnState, Utterance};
use super::persona::{CharacterSettings, PersonaInstructionBuilder};
use super::router::{EventHandler, EventRouter};
use super::transcript::{TranscriptCoalescer, TranscriptUpdate, normalize_transcript};
use crate::core::realtime::{
    AudioConstraints, AudioSink, BoxedTransport, ChannelState, Modality, OpenParams,
    OutboundCommand, RealtimeError, RealtimeResult, Session, TokenProvider, TransportFactory,
    TurnDetectionConfig,
};
use crate::utils::wait_until;

/// Default delay between session configuration and the opening line.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);
/// Default pause between tearing down and rebuilding on persona switch.
pub const DEFAULT_SWITCH_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_CHANNEL_OPEN_MAX_ATTEMPTS: u32 = 50;
pub const DEFAULT_CHANNEL_OPEN_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Configuration
// =============================================================================

/// Timing and session parameters for [`ConversationController`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub settle_delay: Duration,
    pub switch_delay: Duration,
    pub channel_open_max_attempts: u32,
    pub channel_open_interval: Duration,
    pub turn_detection: TurnDetectionConfig,
    pub audio_constraints: AudioConstraints,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            switch_delay: DEFAULT_SWITCH_DELAY,
            channel_open_max_attempts: DEFAULT_CHANNEL_OPEN_MAX_ATTEMPTS,
            channel_open_interval: DEFAULT_CHANNEL_OPEN_INTERVAL,
            turn_detection: TurnDetectionConfig::default(),
            audio_constraints: AudioConstraints::default(),
        }
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "Idle"),
            ControllerState::Starting => write!(f, "Starting"),
            ControllerState::Active => write!(f, "Active"),
            ControllerState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone)]
pub struct ConversationStatus {
    pub state: ControllerState,
    pub turn: TurnState,
    pub generation: u64,
    pub channel_state: ChannelState,
    pub session: Option<Session>,
    pub character_id: Option<String>,
}

/// Callback for interim (live caption) text.
pub type InterimCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Callback for finalized utterances.
pub type UtteranceCallback = Arc<dyn Fn(&Utterance) + Send + Sync>;
/// Callback for listening/responding flag changes.
pub type TurnStateCallback = Arc<dyn Fn(TurnState) + Send + Sync>;
/// Callback for errors reported while a session is running.
pub type ErrorCallback = Arc<dyn Fn(&RealtimeError) + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    user_interim: Option<InterimCallback>,
    user_utterance: Option<UtteranceCallback>,
    assistant_interim: Option<InterimCallback>,
    assistant_utterance: Option<UtteranceCallback>,
    turn_state: Option<TurnStateCallback>,
    error: Option<ErrorCallback>,
}

#[derive(Default)]
struct Inner {
    state: ControllerState,
    generation: u64,
    settings: Option<CharacterSettings>,
    transport: Option<BoxedTransport>,
    router_task: Option<JoinHandle<()>>,
    coalescer: TranscriptCoalescer,
    turn: TurnState,
    history: Vec<Utterance>,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
            && matches!(
                self.state,
                ControllerState::Starting | ControllerState::Active
            )
    }

    fn open_transport(&self) -> Option<&BoxedTransport> {
        self.transport
            .as_ref()
            .filter(|t| t.channel_state() == ChannelState::Open)
    }
}

struct Shared {
    inner: Mutex<Inner>,
    callbacks: RwLock<Callbacks>,
}

impl Shared {
    /// Router handler body: update flags and transcripts, then notify.
    fn handle_event(&self, generation: u64, event: &ConversationEvent) {
        let (update, turn_changed) = {
            let mut inner = self.inner.lock();
            if !inner.is_current(generation) {
                tracing::trace!(generation, "Dropping event from superseded session");
                return;
            }

            let before = inner.turn;
            match event {
                ConversationEvent::SpeechStarted => inner.turn.listening = true,
                ConversationEvent::SpeechStopped => inner.turn.listening = false,
                ConversationEvent::ResponseStarted => inner.turn.responding = true,
                ConversationEvent::ResponseDone => inner.turn.responding = false,
                _ => {}
            }

            let update = inner.coalescer.handle(event);
            if let Some(TranscriptUpdate::Final(utterance)) = &update {
                inner.history.push(utterance.clone());
            }

            let turn_changed = (before != inner.turn).then_some(inner.turn);
            (update, turn_changed)
        };

        let callbacks = self.callbacks.read().clone();
        if let (Some(turn), Some(cb)) = (turn_changed, callbacks.turn_state.as_ref()) {
            cb(turn);
        }

        match update {
            Some(TranscriptUpdate::Interim { speaker, text }) => {
                let cb = match speaker {
                    Speaker::User => callbacks.user_interim,
                    Speaker::Assistant => callbacks.assistant_interim,
                };
                if let Some(cb) = cb {
                    cb(&text);
                }
            }
            Some(TranscriptUpdate::Final(utterance)) => {
                tracing::info!(speaker = %utterance.speaker, turn = utterance.turn, "Utterance finalized");
                let cb = match utterance.speaker {
                    Speaker::User => callbacks.user_utterance,
                    Speaker::Assistant => callbacks.assistant_utterance,
                };
                if let Some(cb) = cb {
                    cb(&utterance);
                }
            }
            None => {}
        }
    }

    fn notify_error(&self, generation: u64, error: RealtimeError) {
        if !self.inner.lock().is_current(generation) {
            return;
        }
        tracing::warn!(generation, "Session error: {}", error);
        let cb = self.callbacks.read().error.clone();
        if let Some(cb) = cb {
            cb(&error);
        }
    }

    fn notify_turn_state(&self, turn: TurnState) {
        let cb = self.callbacks.read().turn_state.clone();
        if let Some(cb) = cb {
            cb(turn);
        }
    }
}

fn build_router(shared: Weak<Shared>, generation: u64) -> EventRouter {
    let handler: EventHandler = Arc::new(move |event: &ConversationEvent| {
        if let Some(shared) = shared.upgrade() {
            shared.handle_event(generation, event);
        }
    });

    let mut router = EventRouter::new();
    for kind in EventKind::ALL {
        router.on(kind, handler.clone());
    }
    router
}

fn spawn_router(
    router: EventRouter,
    mut inbound: mpsc::UnboundedReceiver<String>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(raw) = inbound.recv().await {
            router.dispatch(&raw);
        }
        tracing::debug!(generation, "Router task ended");
    })
}

fn cancelled() -> RealtimeError {
    RealtimeError::ConnectionFailed("session start cancelled".to_string())
}

// =============================================================================
// Controller
// =============================================================================

/// Orchestrates one voice conversation at a time.
pub struct ConversationController {
    shared: Arc<Shared>,
    token_provider: Arc<dyn TokenProvider>,
    transports: Arc<dyn TransportFactory>,
    sink: Arc<dyn AudioSink>,
    builder: PersonaInstructionBuilder,
    config: ControllerConfig,
}

impl ConversationController {
    pub fn new(
        token_provider: Arc<dyn TokenProvider>,
        transports: Arc<dyn TransportFactory>,
        sink: Arc<dyn AudioSink>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                callbacks: RwLock::new(Callbacks::default()),
            }),
            token_provider,
            transports,
            sink,
            builder: PersonaInstructionBuilder::default(),
            config,
        }
    }

    pub fn with_instruction_builder(mut self, builder: PersonaInstructionBuilder) -> Self {
        self.builder = builder;
        self
    }

    // -------------------------------------------------------------------------
    // Callback registration
    // -------------------------------------------------------------------------

    pub fn on_user_interim(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.callbacks.write().user_interim = Some(Arc::new(cb));
    }

    pub fn on_user_utterance(&self, cb: impl Fn(&Utterance) + Send + Sync + 'static) {
        self.shared.callbacks.write().user_utterance = Some(Arc::new(cb));
    }

    pub fn on_assistant_interim(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.callbacks.write().assistant_interim = Some(Arc::new(cb));
    }

    pub fn on_assistant_utterance(&self, cb: impl Fn(&Utterance) + Send + Sync + 'static) {
        self.shared.callbacks.write().assistant_utterance = Some(Arc::new(cb));
    }

    pub fn on_turn_state(&self, cb: impl Fn(TurnState) + Send + Sync + 'static) {
        self.shared.callbacks.write().turn_state = Some(Arc::new(cb));
    }

    pub fn on_error(&self, cb: impl Fn(&RealtimeError) + Send + Sync + 'static) {
        self.shared.callbacks.write().error = Some(Arc::new(cb));
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn state(&self) -> ControllerState {
        self.shared.inner.lock().state
    }

    pub fn status(&self) -> ConversationStatus {
        let inner = self.shared.inner.lock();
        let session = inner.transport.as_ref().and_then(|t| t.session());
        ConversationStatus {
            state: inner.state,
            turn: inner.turn,
            generation: inner.generation,
            channel_state: inner
                .transport
                .as_ref()
                .map(|t| t.channel_state())
                .unwrap_or_default(),
            session,
            character_id: inner.settings.as_ref().map(|s| s.character_id.clone()),
        }
    }

    /// Finalized utterances of the current conversation, oldest first.
    pub fn history(&self) -> Vec<Utterance> {
        self.shared.inner.lock().history.clone()
    }

    pub fn current_settings(&self) -> Option<CharacterSettings> {
        self.shared.inner.lock().settings.clone()
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Start a session with `settings`.
    ///
    /// Fails with `AlreadyActive` unless idle. Any failure after that leaves
    /// the controller idle with no session and returns `StartFailed`.
    pub async fn start(&self, settings: CharacterSettings) -> ConversationResult<()> {
        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.state != ControllerState::Idle {
                return Err(ConversationError::AlreadyActive);
            }
            inner.state = ControllerState::Starting;
            inner.generation += 1;
            inner.settings = Some(settings.clone());
            inner.generation
        };

        tracing::info!(generation, persona = %settings.character_id, "Starting conversation");

        match self.bring_up(generation, &settings).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(generation, "Failed to start conversation: {}", e);
                self.teardown(Some(generation)).await;
                Err(ConversationError::StartFailed(e))
            }
        }
    }

    async fn bring_up(&self, generation: u64, settings: &CharacterSettings) -> RealtimeResult<()> {
        let token = self
            .token_provider
            .fetch_token(&settings.voice_id, &settings.target_language)
            .await?;

        if !self.shared.inner.lock().is_current(generation) {
            return Err(cancelled());
        }

        let mut transport = self.transports.create();
        let weak = Arc::downgrade(&self.shared);
        transport.on_error(Arc::new(move |error: RealtimeError| {
            if let Some(shared) = weak.upgrade() {
                shared.notify_error(generation, error);
            }
        }));

        let params = OpenParams {
            token: token.token.clone(),
            model_id: token.model_id.clone(),
            voice_id: settings.voice_id.clone(),
            audio_constraints: self.config.audio_constraints.clone(),
            sink: self.sink.clone(),
        };
        if let Err(e) = transport.open(params).await {
            transport.close().await;
            return Err(e);
        }

        let Some(inbound) = transport.take_inbound() else {
            transport.close().await;
            return Err(RealtimeError::ConnectionFailed(
                "transport has no inbound channel".to_string(),
            ));
        };

        // Install the session only if nobody cancelled us while negotiating
        let stale = {
            let mut inner = self.shared.inner.lock();
            if inner.is_current(generation) {
                let router = build_router(Arc::downgrade(&self.shared), generation);
                inner.router_task = Some(spawn_router(router, inbound, generation));
                inner.transport = Some(transport);
                None
            } else {
                Some(transport)
            }
        };
        if let Some(mut transport) = stale {
            transport.close().await;
            return Err(cancelled());
        }

        let shared = self.shared.clone();
        wait_until(
            || {
                let inner = shared.inner.lock();
                inner.is_current(generation) && inner.open_transport().is_some()
            },
            self.config.channel_open_max_attempts,
            self.config.channel_open_interval,
        )
        .await
        .map_err(|e| RealtimeError::Timeout(format!("control channel did not open: {e}")))?;

        {
            let mut inner = self.shared.inner.lock();
            if !inner.is_current(generation) {
                return Err(cancelled());
            }
            let transport = inner.open_transport().ok_or(RealtimeError::ChannelNotReady)?;
            transport.send(OutboundCommand::SessionConfigure {
                instructions: self.builder.build(settings),
                turn_detection: self.config.turn_detection.clone(),
            })?;
            inner.state = ControllerState::Active;
            inner.turn = TurnState::default();
        }
        tracing::info!(generation, "Conversation active");

        tokio::time::sleep(self.config.settle_delay).await;

        self.send_opening_line(generation)
    }

    fn send_opening_line(&self, generation: u64) -> RealtimeResult<()> {
        let inner = self.shared.inner.lock();
        if inner.generation != generation || inner.state != ControllerState::Active {
            return Err(cancelled());
        }
        let settings = inner.settings.as_ref().ok_or(RealtimeError::ChannelNotReady)?;
        let transport = inner.open_transport().ok_or(RealtimeError::ChannelNotReady)?;
        transport.send(OutboundCommand::CreateResponse {
            instructions: self.builder.build_opening_line(settings),
            modalities: Modality::text_and_audio(),
        })
    }

    /// Ask the persona to speak its opening line now.
    pub fn trigger_opening_line(&self) -> ConversationResult<()> {
        let generation = self.shared.inner.lock().generation;
        self.send_opening_line(generation)
            .map_err(|_| ConversationError::ChannelNotReady)
    }

    /// Send a typed user message followed by a response request carrying
    /// fresh persona instructions.
    pub fn send_text(&self, text: &str) -> ConversationResult<()> {
        let mut inner = self.shared.inner.lock();
        let instructions = match (inner.open_transport(), inner.settings.as_ref()) {
            (Some(_), Some(settings)) => self.builder.build(settings),
            _ => return Err(ConversationError::ChannelNotReady),
        };

        let normalized = normalize_transcript(text);
        if normalized.is_empty() {
            return Ok(());
        }

        {
            let transport = inner
                .open_transport()
                .ok_or(ConversationError::ChannelNotReady)?;
            transport
                .send(OutboundCommand::InjectUserText {
                    text: text.to_string(),
                })
                .map_err(|_| ConversationError::ChannelNotReady)?;
            transport
                .send(OutboundCommand::CreateResponse {
                    instructions,
                    modalities: Modality::text_and_audio(),
                })
                .map_err(|_| ConversationError::ChannelNotReady)?;
        }

        let turn = inner
            .coalescer
            .buffer(Speaker::User)
            .map(|b| b.turn)
            .unwrap_or_default();
        inner.history.push(Utterance {
            speaker: Speaker::User,
            text: normalized,
            turn,
        });
        Ok(())
    }

    /// Replace the persona.
    ///
    /// While active this is a full stop, a short pause, a cleared history and
    /// a fresh start. Otherwise the settings are kept for the next `start()`.
    pub async fn switch_persona(&self, settings: CharacterSettings) -> ConversationResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state != ControllerState::Active {
                tracing::debug!(persona = %settings.character_id, "Storing persona for next start");
                inner.settings = Some(settings);
                return Ok(());
            }
        }

        tracing::info!(persona = %settings.character_id, "Switching persona");
        self.stop().await;
        tokio::time::sleep(self.config.switch_delay).await;
        self.shared.inner.lock().history.clear();
        self.start(settings).await
    }

    /// Tear down the session. Safe in any state.
    pub async fn stop(&self) {
        self.teardown(None).await;
    }

    /// Shared by `stop()` and failed starts. With `Some(generation)` only
    /// that generation is torn down.
    async fn teardown(&self, only: Option<u64>) {
        let (transport, router_task, generation) = {
            let mut inner = self.shared.inner.lock();
            if let Some(generation) = only
                && inner.generation != generation
            {
                return;
            }
            if inner.state == ControllerState::Idle && inner.transport.is_none() {
                return;
            }
            inner.generation += 1;
            inner.state = ControllerState::Stopping;
            (
                inner.transport.take(),
                inner.router_task.take(),
                inner.generation,
            )
        };

        tracing::info!(generation, "Stopping conversation");

        if let Some(task) = router_task {
            task.abort();
        }
        if let Some(mut transport) = transport {
            transport.close().await;
        }

        {
            let mut inner = self.shared.inner.lock();
            if inner.generation == generation {
                inner.state = ControllerState::Idle;
                inner.coalescer.clear();
                inner.turn = TurnState::default();
            }
        }
        self.shared.notify_turn_state(TurnState::default());
    }
}

impl Drop for ConversationController {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        inner.generation += 1;
        if let Some(task) = inner.router_task.take() {
            task.abort();
        }
        // Dropping the transport cancels its I/O task
        inner.transport = None;
        inner.state = ControllerState::Idle;
    }
}
