// src/lib.rs

pub mod config;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod model;
pub mod relay;
#[cfg(feature = "pingora-integration")]
pub mod server;
pub mod upstream;

/// The public prelude for the `oidc-relay` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{
        IssuerSource, RelayConfig, RelayConfigBuilder, ResponseMode, StatusPolicy, UserInfoMethod,
    };
    pub use crate::discovery::{DiscoveryResolver, Endpoint, ResolvedEndpoints};
    pub use crate::error::{OidcRelayError, Stage};
    pub use crate::handler::{FlowState, RelayHandler, RelayResponse};
    pub use crate::model::{ProviderMetadata, UserAttributes};
    pub use crate::relay::{project, Credential, CredentialRelay};
    #[cfg(feature = "pingora-integration")]
    pub use crate::server::RelayService;
}
