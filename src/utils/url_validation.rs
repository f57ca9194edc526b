//! Endpoint URL validation.
//!
//! The token endpoint and the realtime endpoint both carry credentials, so
//! they must use a TLS scheme (`https` / `wss`). Plain `http` / `ws` is
//! accepted only for loopback hosts, which is what local mock servers use.

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be {expected}, got: {actual}")]
    SecureSchemeRequired {
        expected: &'static str,
        actual: String,
    },

    #[error("URL must have a host")]
    MissingHost,
}

/// What an endpoint is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Plain HTTP request/response
    Http,
    /// WebSocket control channel
    WebSocket,
}

impl EndpointKind {
    fn secure_scheme(self) -> &'static str {
        match self {
            EndpointKind::Http => "https",
            EndpointKind::WebSocket => "wss",
        }
    }

    fn plain_scheme(self) -> &'static str {
        match self {
            EndpointKind::Http => "http",
            EndpointKind::WebSocket => "ws",
        }
    }
}

/// Whether the URL points at this machine.
pub fn is_loopback_host(parsed: &Url) -> bool {
    match parsed.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Validates an endpoint URL and returns it parsed.
///
/// # Example
/// ```rust,ignore
/// use voice_tutor::utils::url_validation::{EndpointKind, validate_endpoint_url};
///
/// assert!(validate_endpoint_url("https://api.example.com/token", EndpointKind::Http).is_ok());
/// assert!(validate_endpoint_url("ws://127.0.0.1:9000", EndpointKind::WebSocket).is_ok());
/// assert!(validate_endpoint_url("ws://example.com", EndpointKind::WebSocket).is_err());
/// ```
pub fn validate_endpoint_url(url: &str, kind: EndpointKind) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url)?;

    if parsed.host().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    let scheme = parsed.scheme();
    if scheme == kind.secure_scheme() {
        return Ok(parsed);
    }

    if scheme == kind.plain_scheme() && is_loopback_host(&parsed) {
        return Ok(parsed);
    }

    warn!(url = %parsed, "Rejecting endpoint without a secure scheme");
    Err(UrlValidationError::SecureSchemeRequired {
        expected: kind.secure_scheme(),
        actual: scheme.to_string(),
    })
}
