// src/discovery.rs

//! OIDC discovery: fetches `{issuer}/.well-known/openid-configuration` and turns
//! it into a validated set of endpoints.

use crate::config::StatusPolicy;
use crate::error::{OidcRelayError, Stage};
use crate::model::ProviderMetadata;
use crate::upstream::fetch_body;
use std::fmt;
use tracing::{debug, instrument};
use url::Url;

pub const WELL_KNOWN_SUFFIX: &str = "/.well-known/openid-configuration";

/// An endpoint URL that passed validation.
///
/// Keeps the exact text from the discovery document alongside the parsed
/// value, so `as_str` returns the input unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    raw: String,
    url: Url,
}

impl Endpoint {
    /// Parses `raw` as an absolute `http`/`https` URL with a host.
    fn parse(field: &'static str, raw: &str) -> Result<Self, OidcRelayError> {
        if raw.trim().is_empty() {
            return Err(OidcRelayError::Validation {
                field,
                reason: "missing or empty".to_string(),
            });
        }
        let url = Url::parse(raw).map_err(|e| OidcRelayError::Validation {
            field,
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(OidcRelayError::Validation {
                field,
                reason: "not an absolute http(s) URL".to_string(),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A provider's validated endpoint set.
///
/// Immutable once built and scoped to the request that resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    issuer: String,
    authorization_endpoint: Endpoint,
    token_endpoint: Endpoint,
    userinfo_endpoint: Endpoint,
    end_session_endpoint: Option<Endpoint>,
    jwks_uri: Endpoint,
}

impl ResolvedEndpoints {
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn authorization_endpoint(&self) -> &Endpoint {
        &self.authorization_endpoint
    }

    pub fn token_endpoint(&self) -> &Endpoint {
        &self.token_endpoint
    }

    pub fn userinfo_endpoint(&self) -> &Endpoint {
        &self.userinfo_endpoint
    }

    pub fn end_session_endpoint(&self) -> Option<&Endpoint> {
        self.end_session_endpoint.as_ref()
    }

    pub fn jwks_uri(&self) -> &Endpoint {
        &self.jwks_uri
    }
}

impl TryFrom<ProviderMetadata> for ResolvedEndpoints {
    type Error = OidcRelayError;

    fn try_from(metadata: ProviderMetadata) -> Result<Self, Self::Error> {
        let authorization_endpoint =
            Endpoint::parse("authorization_endpoint", &metadata.authorization_endpoint)?;
        let token_endpoint = Endpoint::parse("token_endpoint", &metadata.token_endpoint)?;
        let userinfo_endpoint = Endpoint::parse("userinfo_endpoint", &metadata.userinfo_endpoint)?;
        // Only the end-session endpoint may be absent; an empty string counts as absent.
        let end_session_endpoint = match metadata.end_session_endpoint.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(Endpoint::parse("end_session_endpoint", raw)?),
        };
        let jwks_uri = Endpoint::parse("jwks_uri", &metadata.jwks_uri)?;

        Ok(Self {
            issuer: metadata.issuer,
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint,
            end_session_endpoint,
            jwks_uri,
        })
    }
}

/// Builds the discovery document URL for an issuer base.
///
/// Trailing slashes on the base are dropped before the well-known suffix is
/// appended. Fails with a configuration error, before any network call, when
/// the base is empty or not an `http`/`https` URL.
pub fn well_known_url(issuer_base: &str) -> Result<Url, OidcRelayError> {
    let base = issuer_base.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(OidcRelayError::Configuration("issuer base URL is empty".to_string()));
    }

    let parsed = Url::parse(base)
        .map_err(|e| OidcRelayError::Configuration(format!("issuer base URL is invalid: {e}")))?;
    if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
        return Err(OidcRelayError::Configuration(
            "issuer base URL must be an http(s) URL".to_string(),
        ));
    }

    Url::parse(&format!("{base}{WELL_KNOWN_SUFFIX}"))
        .map_err(|e| OidcRelayError::Configuration(format!("discovery URL is invalid: {e}")))
}

/// Resolves provider endpoints through OIDC discovery.
///
/// Holds no cache: every `resolve` call performs one GET.
#[derive(Debug, Clone)]
pub struct DiscoveryResolver {
    http_client: reqwest::Client,
    status_policy: StatusPolicy,
}

impl DiscoveryResolver {
    pub fn new(http_client: reqwest::Client, status_policy: StatusPolicy) -> Self {
        Self {
            http_client,
            status_policy,
        }
    }

    /// Fetches and validates the discovery document for `issuer_base`.
    #[instrument(skip(self), err)]
    pub async fn resolve(&self, issuer_base: &str) -> Result<ResolvedEndpoints, OidcRelayError> {
        let discovery_url = well_known_url(issuer_base)?;
        debug!("Performing OIDC discovery at: {}", discovery_url);

        let request = self.http_client.get(discovery_url);
        let body = fetch_body(request, Stage::Discovery, self.status_policy).await?;

        let metadata: ProviderMetadata =
            serde_json::from_slice(&body).map_err(|e| OidcRelayError::Decode {
                stage: Stage::Discovery,
                reason: e.to_string(),
            })?;

        let resolved = ResolvedEndpoints::try_from(metadata)?;
        debug!("Discovered userinfo endpoint: {}", resolved.userinfo_endpoint());
        Ok(resolved)
    }
}
