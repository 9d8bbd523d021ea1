// src/upstream.rs

use crate::config::StatusPolicy;
use crate::error::{OidcRelayError, Stage};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on a provider response body, for either stage.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Builds the HTTP client shared by both outbound stages.
///
/// The client carries no default headers; `timeout` bounds each call when set.
pub fn build_http_client(timeout: Option<Duration>) -> Result<reqwest::Client, OidcRelayError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| OidcRelayError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Sends `request` once and reads the whole body.
///
/// Under [`StatusPolicy::Strict`] a non-2xx status fails before the body is read.
/// A body larger than [`MAX_BODY_BYTES`] fails as a decode error.
pub(crate) async fn fetch_body(
    request: reqwest::RequestBuilder,
    stage: Stage,
    policy: StatusPolicy,
) -> Result<Bytes, OidcRelayError> {
    let mut response = request
        .send()
        .await
        .map_err(|e| OidcRelayError::network(stage, e))?;

    let status = response.status();
    debug!("{} responded with HTTP {}", stage, status.as_u16());

    if policy == StatusPolicy::Strict && !status.is_success() {
        return Err(OidcRelayError::UpstreamStatus {
            stage,
            status: status.as_u16(),
        });
    }

    if response
        .content_length()
        .is_some_and(|len| len > MAX_BODY_BYTES as u64)
    {
        return Err(oversized(stage));
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| OidcRelayError::network(stage, e))?
    {
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(oversized(stage));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

fn oversized(stage: Stage) -> OidcRelayError {
    warn!("{} response body exceeds {} bytes", stage, MAX_BODY_BYTES);
    OidcRelayError::Decode {
        stage,
        reason: format!("response body exceeds {MAX_BODY_BYTES} bytes"),
    }
}
