// src/handler.rs

//! Per-request orchestration: issuer and credential extraction, discovery,
//! relay, and rendering of the outcome.

use crate::config::{IssuerSource, RelayConfig, ResponseMode};
use crate::discovery::DiscoveryResolver;
use crate::error::{OidcRelayError, Stage};
use crate::model::UserAttributes;
use crate::relay::{project, Credential, CredentialRelay};
use crate::upstream::build_http_client;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{debug, info, instrument, warn};

/// Where a request's flow is.
///
/// Transitions only move forward; the first failure jumps to `Responded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlowState {
    Idle,
    DiscoveryInFlight,
    RelayInFlight,
    Responded,
}

/// A rendered response, independent of the server that writes it.
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The last state the flow entered before responding.
    pub furthest_state: FlowState,
    /// The outbound stage that failed, if any.
    pub failed_stage: Option<Stage>,
}

impl RelayResponse {
    fn plain_text(status: StatusCode, message: String, furthest_state: FlowState) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            status,
            headers,
            body: Bytes::from(message),
            furthest_state,
            failed_stage: None,
        }
    }

    fn from_error(error: &OidcRelayError, furthest_state: FlowState) -> Self {
        let mut response =
            Self::plain_text(error.status_code(), error.public_message(), furthest_state);
        response.failed_stage = error.stage();
        response
    }

    fn not_found() -> Self {
        Self::plain_text(StatusCode::NOT_FOUND, "not found".to_string(), FlowState::Idle)
    }
}

/// The relay's single route.
///
/// Cheap to clone; the HTTP client inside is reference counted.
#[derive(Debug, Clone)]
pub struct RelayHandler {
    config: RelayConfig,
    resolver: DiscoveryResolver,
    relay: CredentialRelay,
}

impl RelayHandler {
    /// Creates a handler with an HTTP client built from `config`.
    pub fn new(config: RelayConfig) -> Result<Self, OidcRelayError> {
        let http_client = build_http_client(config.outbound_timeout)?;
        Ok(Self::with_http_client(config, http_client))
    }

    /// Creates a handler that sends its outbound calls through `http_client`.
    pub fn with_http_client(config: RelayConfig, http_client: reqwest::Client) -> Self {
        let resolver = DiscoveryResolver::new(http_client.clone(), config.status_policy);
        let relay = CredentialRelay::new(http_client, config.userinfo_method, config.status_policy);
        Self {
            config,
            resolver,
            relay,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Runs discovery then relay for one inbound request and renders the result.
    ///
    /// Only `/` is served; the method is not inspected.
    #[instrument(skip(self, headers))]
    pub async fn handle(&self, path: &str, headers: &HeaderMap) -> RelayResponse {
        if path != "/" {
            debug!("No route for path");
            return RelayResponse::not_found();
        }

        let mut state = FlowState::Idle;
        let outcome = self.run(headers, &mut state).await;
        let furthest_state = state;

        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                warn!("Relay flow failed in {:?}: {}", furthest_state, error);
                RelayResponse::from_error(&error, furthest_state)
            }
        };
        debug!(
            "{:?} -> {:?} with HTTP {}",
            furthest_state,
            FlowState::Responded,
            response.status.as_u16()
        );
        response
    }

    async fn run(
        &self,
        headers: &HeaderMap,
        state: &mut FlowState,
    ) -> Result<RelayResponse, OidcRelayError> {
        let issuer = self.issuer_for(headers)?;
        let credential = credential_for(headers)?;

        *state = FlowState::DiscoveryInFlight;
        let resolved = self.resolver.resolve(&issuer).await?;

        *state = FlowState::RelayInFlight;
        let attributes = self.relay.relay(&resolved, &credential).await?;

        let response = self.render(&attributes, *state)?;
        info!("Relayed userinfo for issuer {}", resolved.issuer());
        Ok(response)
    }

    /// The issuer base for this request, per the configured source.
    fn issuer_for(&self, headers: &HeaderMap) -> Result<String, OidcRelayError> {
        let issuer = match &self.config.issuer_source {
            IssuerSource::Header { name } => match headers.get(name) {
                Some(value) => value
                    .to_str()
                    .map_err(|_| {
                        OidcRelayError::Configuration(format!("header {name} is not valid text"))
                    })?
                    .to_string(),
                None => {
                    return Err(OidcRelayError::Configuration(format!("header {name} is missing")))
                }
            },
            IssuerSource::Environment { variable, value } => value.clone().ok_or_else(|| {
                OidcRelayError::Configuration(format!("environment variable {variable} is not set"))
            })?,
            IssuerSource::Fixed(issuer) => issuer.clone(),
        };

        if issuer.trim().is_empty() {
            return Err(OidcRelayError::Configuration("issuer is empty".to_string()));
        }
        Ok(issuer)
    }

    fn render(
        &self,
        attributes: &UserAttributes,
        state: FlowState,
    ) -> Result<RelayResponse, OidcRelayError> {
        let mut headers = HeaderMap::new();
        let body = match &self.config.response_mode {
            ResponseMode::ProjectHeader { claim, header } => {
                let value = project(attributes, claim)?;
                // Claims with control characters cannot travel in a header.
                let value = HeaderValue::from_str(value).map_err(|_| OidcRelayError::Projection {
                    claim: claim.clone(),
                })?;
                headers.insert(header.clone(), value);
                Bytes::new()
            }
            ResponseMode::Attributes => {
                let body = serde_json::to_vec(attributes).map_err(|e| OidcRelayError::Decode {
                    stage: Stage::UserInfo,
                    reason: e.to_string(),
                })?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Bytes::from(body)
            }
        };

        Ok(RelayResponse {
            status: StatusCode::OK,
            headers,
            body,
            furthest_state: state,
            failed_stage: None,
        })
    }
}

fn credential_for(headers: &HeaderMap) -> Result<Credential, OidcRelayError> {
    headers
        .get(AUTHORIZATION)
        .and_then(Credential::from_header)
        .ok_or(OidcRelayError::MissingCredential)
}
