use serde::Deserialize;
use std::path::Path;

use crate::core::conversation::CharacterSettings;
use crate::core::realtime::{AudioConstraints, TurnDetectionConfig};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override the environment.
///
/// # Example YAML structure
/// ```yaml
/// token:
///   endpoint: "https://tutor.example.com/api/realtime/token"
///   api_key: "backend-key"
///   timeout_seconds: 10
///
/// realtime:
///   url: "wss://api.openai.com/v1/realtime"
///   transcription_model: "whisper-1"
///   outbound_capacity: 256
///
/// session:
///   settle_delay_ms: 1000
///   switch_delay_ms: 500
///   channel_open_max_attempts: 50
///   channel_open_interval_ms: 100
///   max_sentences: 3
///
/// turn_detection:
///   threshold: 0.5
///   prefix_padding_ms: 300
///   silence_duration_ms: 500
///
/// audio:
///   echo_cancellation: true
///   noise_suppression: true
///   auto_gain_control: true
///
/// personas:
///   - character_id: "mia"
///     display_name: "Mia"
///     gender: female
///     voice_id: "coral"
///     target_language: "French"
///     first_message_text: "Salut ! Qu'est-ce que je te sers ?"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub token: Option<TokenYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub session: Option<SessionYaml>,
    pub turn_detection: Option<TurnDetectionConfig>,
    pub audio: Option<AudioConstraints>,
    pub personas: Option<Vec<CharacterSettings>>,
}

/// Token backend configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TokenYaml {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Realtime transport configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub url: Option<String>,
    /// Empty string disables user transcription
    pub transcription_model: Option<String>,
    pub outbound_capacity: Option<usize>,
}

/// Session timing from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub settle_delay_ms: Option<u64>,
    pub switch_delay_ms: Option<u64>,
    pub channel_open_max_attempts: Option<u32>,
    pub channel_open_interval_ms: Option<u64>,
    pub max_sentences: Option<u8>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::Gender;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
token:
  endpoint: "https://tutor.example.com/token"
  api_key: "backend-key"
  timeout_seconds: 5

realtime:
  url: "wss://realtime.example.com/v1/realtime"
  transcription_model: "whisper-1"
  outbound_capacity: 64

session:
  settle_delay_ms: 250
  channel_open_max_attempts: 20

turn_detection:
  threshold: 0.7

audio:
  noise_suppression: false

personas:
  - character_id: "mia"
    display_name: "Mia"
    gender: female
    voice_id: "coral"
    target_language: "French"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let token = config.token.as_ref().unwrap();
        assert_eq!(
            token.endpoint,
            Some("https://tutor.example.com/token".to_string())
        );
        assert_eq!(token.timeout_seconds, Some(5));

        let realtime = config.realtime.as_ref().unwrap();
        assert_eq!(realtime.outbound_capacity, Some(64));

        let session = config.session.as_ref().unwrap();
        assert_eq!(session.settle_delay_ms, Some(250));
        assert_eq!(session.switch_delay_ms, None);
        assert_eq!(session.channel_open_max_attempts, Some(20));

        let turn = config.turn_detection.as_ref().unwrap();
        assert_eq!(turn.threshold, 0.7);
        assert_eq!(turn.silence_duration_ms, 500);

        let audio = config.audio.as_ref().unwrap();
        assert!(!audio.noise_suppression);
        assert!(audio.echo_cancellation);
        assert_eq!(audio.channel_count, 1);

        let personas = config.personas.as_ref().unwrap();
        assert_eq!(personas.len(), 1);
        assert_eq!(personas[0].gender, Gender::Female);
        assert_eq!(personas[0].target_language, "French");
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.token.is_none());
        assert!(config.realtime.is_none());
        assert!(config.personas.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tutor.yaml");
        fs::write(&path, "session:\n  switch_delay_ms: 10\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.session.unwrap().switch_delay_ms, Some(10));
    }

    #[test]
    fn test_from_file_not_found() {
        let result = YamlConfig::from_file(Path::new("/nonexistent/tutor.yaml"));
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "personas: [ {character_id: ").unwrap();

        let result = YamlConfig::from_file(&path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML config")
        );
    }
}
