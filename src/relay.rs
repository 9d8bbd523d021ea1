// src/relay.rs

//! Forwards the caller's bearer credential to the provider's user-info endpoint.

use crate::config::{StatusPolicy, UserInfoMethod};
use crate::discovery::ResolvedEndpoints;
use crate::error::{OidcRelayError, Stage};
use crate::model::UserAttributes;
use crate::upstream::fetch_body;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use std::fmt;
use tracing::{debug, instrument};

/// The inbound `Authorization` header value, forwarded byte-for-byte.
///
/// The relay neither inspects nor adds an auth scheme. `Debug` never prints
/// the value.
#[derive(Clone)]
pub struct Credential(HeaderValue);

impl Credential {
    /// Wraps an inbound header value. Returns `None` for an empty value.
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        if value.is_empty() {
            return None;
        }
        let mut value = value.clone();
        value.set_sensitive(true);
        Some(Self(value))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    fn header_value(&self) -> HeaderValue {
        self.0.clone()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Calls the user-info endpoint with a forwarded credential.
#[derive(Debug, Clone)]
pub struct CredentialRelay {
    http_client: reqwest::Client,
    method: UserInfoMethod,
    status_policy: StatusPolicy,
}

impl CredentialRelay {
    pub fn new(
        http_client: reqwest::Client,
        method: UserInfoMethod,
        status_policy: StatusPolicy,
    ) -> Self {
        Self {
            http_client,
            method,
            status_policy,
        }
    }

    /// Issues one request to `resolved`'s user-info endpoint carrying exactly
    /// one header, `Authorization`, and parses the JSON object it returns.
    #[instrument(skip(self, resolved, credential), fields(method = ?self.method), err)]
    pub async fn relay(
        &self,
        resolved: &ResolvedEndpoints,
        credential: &Credential,
    ) -> Result<UserAttributes, OidcRelayError> {
        let endpoint = resolved.userinfo_endpoint();
        debug!("Calling userinfo endpoint: {}", endpoint);

        let request = self
            .http_client
            .request(self.method.as_method(), endpoint.url().clone())
            .header(AUTHORIZATION, credential.header_value());

        let body = fetch_body(request, Stage::UserInfo, self.status_policy).await?;

        let attributes = UserAttributes::from_slice(&body).map_err(|reason| OidcRelayError::Decode {
            stage: Stage::UserInfo,
            reason,
        })?;
        debug!("Received {} userinfo claims", attributes.len());
        Ok(attributes)
    }
}

/// Extracts one string claim for exposure in a single header.
pub fn project<'a>(attributes: &'a UserAttributes, claim: &str) -> Result<&'a str, OidcRelayError> {
    attributes.get_str(claim).ok_or_else(|| OidcRelayError::Projection {
        claim: claim.to_string(),
    })
}
