// src/error.rs

use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// The outbound call a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching `{issuer}/.well-known/openid-configuration`.
    Discovery,
    /// Calling the provider's user-info endpoint with the forwarded credential.
    UserInfo,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Discovery => f.write_str("discovery"),
            Stage::UserInfo => f.write_str("userinfo"),
        }
    }
}

/// The primary error type for the `oidc-relay` library.
#[derive(Debug, Error)]
pub enum OidcRelayError {
    /// The issuer source is missing, empty, or not a usable URL, or a
    /// configuration value is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The inbound request did not carry an `Authorization` header.
    #[error("The inbound request has no Authorization header")]
    MissingCredential,

    /// An outbound call failed at the transport level (DNS, connect, TLS, timeout).
    #[error("Network error during {stage}: {source}")]
    Network {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-2xx status. Only raised under
    /// [`StatusPolicy::Strict`](crate::config::StatusPolicy::Strict).
    #[error("Provider returned HTTP {status} during {stage}")]
    UpstreamStatus { stage: Stage, status: u16 },

    /// A response body was not the JSON document that was expected.
    #[error("Failed to decode {stage} response: {reason}")]
    Decode { stage: Stage, reason: String },

    /// A discovery document field is absent or not an absolute URL.
    #[error("Invalid discovery field '{field}': {reason}")]
    Validation { field: &'static str, reason: String },

    /// The claim configured for projection is absent or not a string.
    #[error("User-info claim '{claim}' is missing or not a string")]
    Projection { claim: String },
}

impl OidcRelayError {
    /// Wraps a transport error, dropping the URL so it never reaches logs or callers.
    pub(crate) fn network(stage: Stage, source: reqwest::Error) -> Self {
        OidcRelayError::Network {
            stage,
            source: source.without_url(),
        }
    }

    /// The outbound stage this error came from, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OidcRelayError::Network { stage, .. }
            | OidcRelayError::UpstreamStatus { stage, .. }
            | OidcRelayError::Decode { stage, .. } => Some(*stage),
            OidcRelayError::Validation { .. } => Some(Stage::Discovery),
            OidcRelayError::Projection { .. } => Some(Stage::UserInfo),
            OidcRelayError::Configuration(_) | OidcRelayError::MissingCredential => None,
        }
    }

    /// Whether the failure is attributed to the provider's side of the network.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            OidcRelayError::Network { .. } | OidcRelayError::UpstreamStatus { .. }
        )
    }

    /// The HTTP status written back to the caller for this error.
    ///
    /// Caller-correctable problems are 4xx. A provider that could not be
    /// reached or refused the call is 503 (504 on timeout); a provider that
    /// answered with content the relay cannot use is 502.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OidcRelayError::Configuration(_) => StatusCode::BAD_REQUEST,
            OidcRelayError::MissingCredential => StatusCode::UNAUTHORIZED,
            OidcRelayError::Network { source, .. } if source.is_timeout() => {
                StatusCode::GATEWAY_TIMEOUT
            }
            OidcRelayError::Network { .. } | OidcRelayError::UpstreamStatus { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            OidcRelayError::Decode { .. }
            | OidcRelayError::Validation { .. }
            | OidcRelayError::Projection { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// A plain-text description safe to hand to the caller.
    ///
    /// Names the error class and the stage, field or claim involved. Never
    /// includes URLs, upstream bodies or credential material.
    pub fn public_message(&self) -> String {
        match self {
            OidcRelayError::Configuration(_) => {
                "configuration error: issuer source is missing or invalid".to_string()
            }
            OidcRelayError::MissingCredential => "missing Authorization header".to_string(),
            OidcRelayError::Network { stage, source } if source.is_timeout() => {
                format!("network error: {stage} request timed out")
            }
            OidcRelayError::Network { stage, .. } => {
                format!("network error: {stage} request failed")
            }
            OidcRelayError::UpstreamStatus { stage, status } => {
                format!("network error: {stage} returned HTTP {status}")
            }
            OidcRelayError::Decode { stage, .. } => {
                format!("decode error: invalid {stage} response")
            }
            OidcRelayError::Validation { field, .. } => format!("validation error: {field}"),
            OidcRelayError::Projection { claim } => format!("projection error: {claim}"),
        }
    }
}
