//! Configuration module for the voice tutor
//!
//! Handles configuration from .env files, environment variables and YAML
//! files. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use voice_tutor::config::TutorConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = TutorConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = TutorConfig::from_file(&PathBuf::from("tutor.yaml"))?;
//! println!("{} personas configured", config.personas.len());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

mod yaml;

pub use yaml::{RealtimeYaml, SessionYaml, TokenYaml, YamlConfig};

use crate::core::conversation::{
    CharacterSettings, ControllerConfig, DEFAULT_MAX_SENTENCES, PersonaInstructionBuilder,
};
use crate::core::realtime::{
    DEFAULT_REALTIME_MODEL, HttpTokenProvider, OpenAIRealtimeVoice, RealtimeTransportConfig,
    StaticTokenProvider, TokenProvider,
};
use crate::utils::{EndpointKind, validate_endpoint_url};

/// Default timeout for token backend requests.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Voice tutor configuration
///
/// Contains everything needed to run conversations:
/// - Token backend location and credentials
/// - Realtime transport settings
/// - Session timing and turn detection
/// - Persona catalogue
#[derive(Debug, Clone)]
pub struct TutorConfig {
    /// Backend endpoint that mints ephemeral realtime tokens
    pub token_endpoint: Option<String>,
    /// Bearer key for the token backend. Used directly as the realtime
    /// token when no endpoint is configured.
    pub api_key: Option<String>,
    pub token_timeout: Duration,

    pub realtime: RealtimeTransportConfig,
    pub controller: ControllerConfig,
    pub max_sentences: u8,

    /// Never empty; falls back to the built-in tutor
    pub personas: Vec<CharacterSettings>,
}

/// Zeroize the backend key when the configuration is dropped.
impl Drop for TutorConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            token_endpoint: None,
            api_key: None,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            realtime: RealtimeTransportConfig::default(),
            controller: ControllerConfig::default(),
            max_sentences: DEFAULT_MAX_SENTENCES,
            personas: vec![CharacterSettings::default_tutor()],
        }
    }
}

/// Read an optional environment variable, treating empty values as unset.
fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {e}")),
        None => Ok(None),
    }
}

impl TutorConfig {
    /// Load configuration from environment variables
    ///
    /// Recognised variables: `TOKEN_ENDPOINT`, `TUTOR_API_KEY`,
    /// `REALTIME_URL`, `TRANSCRIPTION_MODEL`, `SETTLE_DELAY_MS`,
    /// `SWITCH_DELAY_MS`, `CHANNEL_OPEN_MAX_ATTEMPTS` and
    /// `CHANNEL_OPEN_INTERVAL_MS`.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Self::env_base()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file on top of the environment
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::env_base()?;
        config.apply_yaml(yaml_config);
        config.validate()?;

        Ok(config)
    }

    fn env_base() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        config.token_endpoint = env_string("TOKEN_ENDPOINT");
        config.api_key = env_string("TUTOR_API_KEY");

        if let Some(url) = env_string("REALTIME_URL") {
            config.realtime.url = url;
        }
        if let Ok(model) = env::var("TRANSCRIPTION_MODEL") {
            config.realtime.transcription_model = Some(model).filter(|m| !m.trim().is_empty());
        }
        if let Some(ms) = env_parse::<u64>("SETTLE_DELAY_MS")? {
            config.controller.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SWITCH_DELAY_MS")? {
            config.controller.switch_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse::<u32>("CHANNEL_OPEN_MAX_ATTEMPTS")? {
            config.controller.channel_open_max_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>("CHANNEL_OPEN_INTERVAL_MS")? {
            config.controller.channel_open_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(token) = yaml.token {
            if token.endpoint.is_some() {
                self.token_endpoint = token.endpoint;
            }
            if token.api_key.is_some() {
                self.api_key = token.api_key;
            }
            if let Some(secs) = token.timeout_seconds {
                self.token_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(realtime) = yaml.realtime {
            if let Some(url) = realtime.url {
                self.realtime.url = url;
            }
            if let Some(model) = realtime.transcription_model {
                self.realtime.transcription_model = Some(model).filter(|m| !m.trim().is_empty());
            }
            if let Some(capacity) = realtime.outbound_capacity {
                self.realtime.outbound_capacity = capacity;
            }
        }

        if let Some(session) = yaml.session {
            if let Some(ms) = session.settle_delay_ms {
                self.controller.settle_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = session.switch_delay_ms {
                self.controller.switch_delay = Duration::from_millis(ms);
            }
            if let Some(attempts) = session.channel_open_max_attempts {
                self.controller.channel_open_max_attempts = attempts;
            }
            if let Some(ms) = session.channel_open_interval_ms {
                self.controller.channel_open_interval = Duration::from_millis(ms);
            }
            if let Some(max) = session.max_sentences {
                self.max_sentences = max;
            }
        }

        if let Some(turn_detection) = yaml.turn_detection {
            self.controller.turn_detection = turn_detection;
        }
        if let Some(audio) = yaml.audio {
            self.controller.audio_constraints = audio;
        }
        if let Some(personas) = yaml.personas.filter(|p| !p.is_empty()) {
            self.personas = personas;
        }
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(endpoint) = &self.token_endpoint {
            validate_endpoint_url(endpoint, EndpointKind::Http)
                .map_err(|e| format!("Invalid token endpoint: {e}"))?;
        }
        validate_endpoint_url(&self.realtime.url, EndpointKind::WebSocket)
            .map_err(|e| format!("Invalid realtime URL: {e}"))?;

        if self.realtime.outbound_capacity == 0 {
            return Err("realtime.outbound_capacity must be greater than zero".into());
        }
        if self.controller.audio_constraints.channel_count != 1 {
            return Err("audio.channel_count must be 1 (mono capture)".into());
        }
        if !(0.0..=1.0).contains(&self.controller.turn_detection.threshold) {
            return Err("turn_detection.threshold must be between 0.0 and 1.0".into());
        }

        let mut seen = std::collections::HashSet::new();
        for persona in &self.personas {
            if persona.character_id.trim().is_empty() {
                return Err("Persona character_id must not be empty".into());
            }
            if !seen.insert(persona.character_id.as_str()) {
                return Err(format!("Duplicate persona id: {}", persona.character_id).into());
            }
            if OpenAIRealtimeVoice::parse(&persona.voice_id).is_none() {
                tracing::warn!(
                    persona = %persona.character_id,
                    voice = %persona.voice_id,
                    "Persona uses a voice this client does not know"
                );
            }
        }

        Ok(())
    }

    /// Find a persona by id
    pub fn persona(&self, character_id: &str) -> Option<&CharacterSettings> {
        self.personas
            .iter()
            .find(|p| p.character_id == character_id)
    }

    pub fn instruction_builder(&self) -> PersonaInstructionBuilder {
        PersonaInstructionBuilder::new(self.max_sentences)
    }

    /// Build the token provider this configuration describes
    ///
    /// An endpoint yields an [`HttpTokenProvider`]. Without one, the API key
    /// itself is used as the session token.
    pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>, String> {
        match (&self.token_endpoint, &self.api_key) {
            (Some(endpoint), api_key) => Ok(Arc::new(
                HttpTokenProvider::new(endpoint.clone(), api_key.clone())
                    .with_timeout(self.token_timeout),
            )),
            (None, Some(key)) => Ok(Arc::new(StaticTokenProvider::new(
                key.clone(),
                DEFAULT_REALTIME_MODEL,
            ))),
            (None, None) => Err("TOKEN_ENDPOINT or TUTOR_API_KEY must be set".to_string()),
        }
    }
}
