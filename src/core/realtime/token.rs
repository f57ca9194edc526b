//! Ephemeral session credentials.
//!
//! The token backend mints a short-lived token for one realtime session.
//! The controller asks for a fresh token on every `start()`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::base::{RealtimeError, RealtimeResult};
use super::openai::DEFAULT_REALTIME_MODEL;

/// Default timeout for token requests.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials for one realtime session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Ephemeral bearer token
    pub token: String,
    /// Model the token was minted for
    pub model_id: String,
    /// Voice echoed back by the backend, if any
    pub voice_id: Option<String>,
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("token", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("voice_id", &self.voice_id)
            .finish()
    }
}

impl Drop for SessionToken {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

/// Source of ephemeral session tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a token for the given voice and conversation language.
    async fn fetch_token(&self, voice_id: &str, language: &str) -> RealtimeResult<SessionToken>;
}

// =============================================================================
// HTTP Token Provider
// =============================================================================

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    voice: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    client_secret: Option<ClientSecret>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    voice: Option<String>,
}

/// Token provider backed by the application's token endpoint.
///
/// Sends `POST <endpoint>` with `{ "voice": .., "language": .. }` and an
/// optional `Authorization: Bearer <api_key>` header.
pub struct HttpTokenProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTokenProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            timeout: TOKEN_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for HttpTokenProvider {
    fn drop(&mut self) {
        if let Some(key) = self.api_key.as_mut() {
            key.zeroize();
        }
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self, voice_id: &str, language: &str) -> RealtimeResult<SessionToken> {
        tracing::debug!(endpoint = %self.endpoint, voice = voice_id, "Requesting session token");

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&TokenRequest {
                voice: voice_id,
                language,
            });

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(|e| {
            RealtimeError::AuthenticationFailed(format!("token request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RealtimeError::AuthenticationFailed(format!(
                "token endpoint returned HTTP {} - {}",
                status, error_text
            )));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            RealtimeError::AuthenticationFailed(format!("Failed to parse token response: {}", e))
        })?;

        let token = body
            .token
            .or(body.client_secret.map(|secret| secret.value))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                RealtimeError::AuthenticationFailed("token response has no token".to_string())
            })?;

        Ok(SessionToken {
            token,
            model_id: body
                .model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
            voice_id: body.voice,
        })
    }
}

/// Hands out the same token every time. Useful for local endpoints and tests.
pub struct StaticTokenProvider {
    token: SessionToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            token: SessionToken {
                token: token.into(),
                model_id: model_id.into(),
                voice_id: None,
            },
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self, _voice_id: &str, _language: &str) -> RealtimeResult<SessionToken> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_token_sends_voice_and_language() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime/token"))
            .and(header("Authorization", "Bearer app-key"))
            .and(body_json(serde_json::json!({ "voice": "shimmer", "language": "French" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "ek_abc",
                "model": "gpt-4o-mini-realtime-preview",
                "voice": "shimmer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpTokenProvider::new(
            format!("{}/api/realtime/token", server.uri()),
            Some("app-key".to_string()),
        );
        let token = provider.fetch_token("shimmer", "French").await.unwrap();

        assert_eq!(token.token, "ek_abc");
        assert_eq!(token.model_id, "gpt-4o-mini-realtime-preview");
        assert_eq!(token.voice_id.as_deref(), Some("shimmer"));
    }

    #[tokio::test]
    async fn test_fetch_token_accepts_client_secret_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_secret": { "value": "ek_nested", "expires_at": 1700000000 }
            })))
            .mount(&server)
            .await;

        let provider = HttpTokenProvider::new(server.uri(), None);
        let token = provider.fetch_token("alloy", "English").await.unwrap();

        assert_eq!(token.token, "ek_nested");
        assert_eq!(token.model_id, DEFAULT_REALTIME_MODEL);
    }

    #[tokio::test]
    async fn test_fetch_token_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = HttpTokenProvider::new(server.uri(), Some("wrong".to_string()));
        let err = provider.fetch_token("alloy", "English").await.unwrap_err();

        match err {
            RealtimeError::AuthenticationFailed(msg) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("bad key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_token_missing_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "model": "m" })),
            )
            .mount(&server)
            .await;

        let provider = HttpTokenProvider::new(server.uri(), None);
        let err = provider.fetch_token("alloy", "English").await.unwrap_err();
        assert!(matches!(err, RealtimeError::AuthenticationFailed(_)));
    }

    #[test]
    fn test_session_token_debug_redacts() {
        let token = SessionToken {
            token: "ek_secret".to_string(),
            model_id: "m".to_string(),
            voice_id: None,
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("ek_secret"));
        assert!(debug.contains("redacted"));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("ek_local", "gpt-4o-realtime-preview");
        let token = provider.fetch_token("alloy", "English").await.unwrap();
        assert_eq!(token.token, "ek_local");
    }
}
