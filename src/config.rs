// src/config.rs

use crate::error::OidcRelayError;
use http::HeaderName;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Header consulted by [`IssuerSource::Header`] unless another name is configured.
pub const DEFAULT_ISSUER_HEADER: &str = "Authorization-URL";
/// Environment variable read by [`IssuerSource::Environment`] unless another name is configured.
pub const DEFAULT_ISSUER_ENV: &str = "OIDC_SERVER";
/// Claim projected into the response by default.
pub const DEFAULT_PROJECT_CLAIM: &str = "name";
/// Response header carrying the projected claim by default.
pub const DEFAULT_PROJECT_HEADER: &str = "x-userinfo-name";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Where the issuer base URL comes from. Exactly one source is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerSource {
    /// Read per request from an inbound header.
    Header { name: HeaderName },
    /// Read once from the process environment when the configuration is built.
    /// `value` is `None` when the variable was unset.
    Environment { variable: String, value: Option<String> },
    /// A literal issuer.
    Fixed(String),
}

impl IssuerSource {
    /// Captures `variable` from the environment now.
    pub fn from_env(variable: &str) -> Self {
        IssuerSource::Environment {
            variable: variable.to_string(),
            value: std::env::var(variable).ok(),
        }
    }

    /// The issuer when it does not depend on the request.
    pub fn static_value(&self) -> Option<&str> {
        match self {
            IssuerSource::Header { .. } => None,
            IssuerSource::Environment { value, .. } => value.as_deref(),
            IssuerSource::Fixed(issuer) => Some(issuer.as_str()),
        }
    }
}

/// The HTTP method used against the user-info endpoint.
///
/// OIDC providers must accept both; some deployments only open one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserInfoMethod {
    #[default]
    Get,
    Post,
}

impl UserInfoMethod {
    pub fn as_method(&self) -> reqwest::Method {
        match self {
            UserInfoMethod::Get => reqwest::Method::GET,
            UserInfoMethod::Post => reqwest::Method::POST,
        }
    }
}

/// What a successful flow writes back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMode {
    /// `200` with one header holding the string value of `claim`.
    ProjectHeader { claim: String, header: HeaderName },
    /// `200` with the full claims map as a JSON body.
    Attributes,
}

impl Default for ResponseMode {
    fn default() -> Self {
        ResponseMode::ProjectHeader {
            claim: DEFAULT_PROJECT_CLAIM.to_string(),
            header: HeaderName::from_static(DEFAULT_PROJECT_HEADER),
        }
    }
}

/// How provider responses with a non-2xx status are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Non-2xx responses fail with `UpstreamStatus` before the body is decoded.
    #[default]
    Strict,
    /// Bodies are decoded regardless of status.
    Lenient,
}

/// The main configuration for the relay.
///
/// It should be constructed using the `RelayConfigBuilder` or loaded from YAML.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Where each request's issuer base URL comes from.
    pub issuer_source: IssuerSource,
    pub userinfo_method: UserInfoMethod,
    pub response_mode: ResponseMode,
    pub status_policy: StatusPolicy,
    /// Deadline for each outbound call. `None` keeps the transport default.
    pub outbound_timeout: Option<Duration>,
    /// Address the Pingora listener binds to.
    pub listen_addr: String,
}

impl RelayConfig {
    /// Parses a YAML document into a configuration.
    ///
    /// An `env` issuer source reads its variable once, here.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, OidcRelayError> {
        let file: RelayFileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| OidcRelayError::Configuration(format!("invalid YAML config: {e}")))?;
        file.into_builder()?.build()
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, OidcRelayError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            OidcRelayError::Configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }
}

/// Selector for the issuer source in the file configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssuerSourceKind {
    Header,
    Env,
    FixedLiteral,
}

/// Selector for the response mode in the file configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseModeKind {
    ProjectHeader,
    Attributes,
}

/// The on-disk shape of the relay configuration. Every field is optional.
///
/// ```yaml
/// issuer_source: env            # header | env | fixed-literal
/// issuer_env: OIDC_SERVER
/// userinfo_method: get          # get | post
/// response_mode: project-header # project-header | attributes
/// project_claim: name
/// project_header: x-userinfo-name
/// status_policy: strict         # strict | lenient
/// outbound_timeout_seconds: 10
/// listen_addr: 0.0.0.0:8080
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayFileConfig {
    pub issuer_source: Option<IssuerSourceKind>,
    pub issuer_header: Option<String>,
    pub issuer_env: Option<String>,
    pub issuer: Option<String>,
    pub userinfo_method: Option<UserInfoMethod>,
    pub response_mode: Option<ResponseModeKind>,
    pub project_claim: Option<String>,
    pub project_header: Option<String>,
    pub status_policy: Option<StatusPolicy>,
    pub outbound_timeout_seconds: Option<u64>,
    pub listen_addr: Option<String>,
}

impl RelayFileConfig {
    pub fn into_builder(self) -> Result<RelayConfigBuilder, OidcRelayError> {
        let mut builder = RelayConfigBuilder::new();

        builder = match self.issuer_source.unwrap_or(IssuerSourceKind::Env) {
            IssuerSourceKind::Header => {
                let name = self.issuer_header.as_deref().unwrap_or(DEFAULT_ISSUER_HEADER);
                builder.issuer_header(name)?
            }
            IssuerSourceKind::Env => {
                builder.issuer_from_env(self.issuer_env.as_deref().unwrap_or(DEFAULT_ISSUER_ENV))
            }
            IssuerSourceKind::FixedLiteral => {
                let issuer = self.issuer.ok_or_else(|| {
                    OidcRelayError::Configuration(
                        "issuer_source is fixed-literal but `issuer` is not set".to_string(),
                    )
                })?;
                builder.issuer_fixed(&issuer)
            }
        };

        if let Some(method) = self.userinfo_method {
            builder = builder.userinfo_method(method);
        }

        builder = match self.response_mode.unwrap_or(ResponseModeKind::ProjectHeader) {
            ResponseModeKind::ProjectHeader => builder.project_claim(
                self.project_claim.as_deref().unwrap_or(DEFAULT_PROJECT_CLAIM),
                self.project_header.as_deref().unwrap_or(DEFAULT_PROJECT_HEADER),
            )?,
            ResponseModeKind::Attributes => builder.attributes_response(),
        };

        if let Some(policy) = self.status_policy {
            builder = builder.status_policy(policy);
        }
        if let Some(seconds) = self.outbound_timeout_seconds {
            builder = builder.outbound_timeout(Duration::from_secs(seconds));
        }
        if let Some(addr) = self.listen_addr {
            builder = builder.listen_addr(addr);
        }
        Ok(builder)
    }
}

/// A builder for creating a `RelayConfig` instance.
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    issuer_source: Option<IssuerSource>,
    userinfo_method: UserInfoMethod,
    response_mode: ResponseMode,
    status_policy: StatusPolicy,
    outbound_timeout: Option<Duration>,
    listen_addr: Option<String>,
}

impl RelayConfigBuilder {
    /// Creates a new `RelayConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the issuer from the named inbound header on every request.
    pub fn issuer_header(mut self, name: &str) -> Result<Self, OidcRelayError> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            OidcRelayError::Configuration(format!("invalid issuer header name '{name}': {e}"))
        })?;
        self.issuer_source = Some(IssuerSource::Header { name });
        Ok(self)
    }

    /// Takes the issuer from an environment variable, read immediately.
    pub fn issuer_from_env(mut self, variable: &str) -> Self {
        self.issuer_source = Some(IssuerSource::from_env(variable));
        self
    }

    /// Uses a literal issuer for every request.
    pub fn issuer_fixed(mut self, issuer: &str) -> Self {
        self.issuer_source = Some(IssuerSource::Fixed(issuer.to_string()));
        self
    }

    /// Sets the issuer source directly.
    pub fn issuer_source(mut self, source: IssuerSource) -> Self {
        self.issuer_source = Some(source);
        self
    }

    pub fn userinfo_method(mut self, method: UserInfoMethod) -> Self {
        self.userinfo_method = method;
        self
    }

    /// Projects `claim` into the response header `header`. This is the default
    /// mode, with claim `name` and header `x-userinfo-name`.
    pub fn project_claim(mut self, claim: &str, header: &str) -> Result<Self, OidcRelayError> {
        if claim.is_empty() {
            return Err(OidcRelayError::Configuration("projected claim name is empty".to_string()));
        }
        let header = HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
            OidcRelayError::Configuration(format!("invalid projection header '{header}': {e}"))
        })?;
        self.response_mode = ResponseMode::ProjectHeader {
            claim: claim.to_string(),
            header,
        };
        Ok(self)
    }

    /// Returns the full claims map as the response body instead of projecting.
    pub fn attributes_response(mut self) -> Self {
        self.response_mode = ResponseMode::Attributes;
        self
    }

    pub fn status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// Bounds every outbound call. This is optional.
    pub fn outbound_timeout(mut self, timeout: Duration) -> Self {
        self.outbound_timeout = Some(timeout);
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Consumes the builder and returns a `RelayConfig` object.
    ///
    /// When no issuer source was chosen, `OIDC_SERVER` is read from the
    /// environment. An empty or unset static issuer is not rejected here: each
    /// request fails with a configuration error instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbound timeout is zero.
    pub fn build(self) -> Result<RelayConfig, OidcRelayError> {
        if self.outbound_timeout == Some(Duration::ZERO) {
            return Err(OidcRelayError::Configuration(
                "outbound_timeout must be greater than zero".to_string(),
            ));
        }

        let issuer_source = self
            .issuer_source
            .unwrap_or_else(|| IssuerSource::from_env(DEFAULT_ISSUER_ENV));

        match &issuer_source {
            IssuerSource::Environment { variable, value: None } => {
                warn!(
                    "Issuer environment variable {} is not set; requests will be rejected",
                    variable
                );
            }
            IssuerSource::Fixed(issuer) if issuer.is_empty() => {
                warn!("Fixed issuer is empty; requests will be rejected");
            }
            _ => {}
        }

        Ok(RelayConfig {
            issuer_source,
            userinfo_method: self.userinfo_method,
            response_mode: self.response_mode,
            status_policy: self.status_policy,
            outbound_timeout: self.outbound_timeout,
            listen_addr: self.listen_addr.unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        })
    }
}
