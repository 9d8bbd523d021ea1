// src/server.rs

//! Pingora integration. The relay answers every request from
//! `request_filter` and never proxies to an upstream peer.

use crate::config::RelayConfig;
use crate::error::OidcRelayError;
use crate::handler::{RelayHandler, RelayResponse};
use async_trait::async_trait;
use http::header::CONTENT_LENGTH;
use pingora_core::server::Server;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::{Error, ErrorType, Result};
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};
use tracing::info;

pub struct RelayService {
    handler: RelayHandler,
}

impl RelayService {
    pub fn new(handler: RelayHandler) -> Self {
        Self { handler }
    }

    pub fn from_config(config: RelayConfig) -> std::result::Result<Self, OidcRelayError> {
        Ok(Self::new(RelayHandler::new(config)?))
    }

    async fn write_response(session: &mut Session, response: RelayResponse) -> Result<()> {
        let header = response_header(&response)?;
        let end_of_stream = response.body.is_empty();
        session.write_response_header(Box::new(header), end_of_stream).await?;
        if !end_of_stream {
            session.write_response_body(Some(response.body), true).await?;
        }
        Ok(())
    }
}

/// Status, rendered headers and an exact `Content-Length` for `response`.
fn response_header(response: &RelayResponse) -> Result<ResponseHeader> {
    let size_hint = Some(response.headers.len() + 1);
    let mut header = ResponseHeader::build(response.status.as_u16(), size_hint)?;
    for (name, value) in response.headers.iter() {
        header.insert_header(name.clone(), value.clone())?;
    }
    header.insert_header(CONTENT_LENGTH, response.body.len().to_string())?;
    Ok(header)
}

#[async_trait]
impl ProxyHttp for RelayService {
    type CTX = ();
    fn new_ctx(&self) -> Self::CTX {}

    async fn request_filter(&self, session: &mut Session, _ctx: &mut Self::CTX) -> Result<bool> {
        let path = session.req_header().uri.path().to_string();
        let headers = session.req_header().headers.clone();

        let response = self.handler.handle(&path, &headers).await;
        Self::write_response(session, response).await?;
        Ok(true) // Filtered, request ends
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        Err(Error::explain(
            ErrorType::InternalError,
            "oidc-relay answers requests itself and has no upstream",
        ))
    }
}

/// Builds a bootstrapped Pingora server with the relay listening on `config.listen_addr`.
pub fn build_server(
    config: RelayConfig,
) -> std::result::Result<Server, Box<dyn std::error::Error>> {
    let listen_addr = config.listen_addr.clone();
    let service = RelayService::from_config(config)?;

    let mut server = Server::new(None)?;
    server.bootstrap();

    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, service);
    proxy_service.add_tcp(&listen_addr);
    server.add_service(proxy_service);

    info!("oidc-relay listening on {}", listen_addr);
    Ok(server)
}
