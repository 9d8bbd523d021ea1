use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use oidc_relay::prelude::*;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WELL_KNOWN: &str = "/.well-known/openid-configuration";

/// Serves a discovery document whose endpoints all live on the mock server.
async fn mount_discovery(mock_server: &MockServer) {
    let base = mock_server.uri();
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/auth"),
            "token_endpoint": format!("{base}/token"),
            "userinfo_endpoint": format!("{base}/userinfo"),
            "jwks_uri": format!("{base}/jwks")
        })))
        .mount(mock_server)
        .await;
}

fn fixed_handler(issuer: &str) -> RelayHandler {
    let config = RelayConfigBuilder::new()
        .issuer_fixed(issuer)
        .build()
        .expect("Failed to build relay config");
    RelayHandler::new(config).expect("Failed to build relay handler")
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(token).unwrap());
    headers
}

#[tokio::test]
async fn test_projects_name_into_header() {
    let mock_server = MockServer::start().await;
    mount_discovery(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Alice"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = fixed_handler(&mock_server.uri())
        .handle("/", &bearer("Bearer abc123"))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.get("x-userinfo-name").unwrap(), "Alice");
    assert_eq!(response.furthest_state, FlowState::RelayInFlight);
    assert_eq!(response.failed_stage, None);
}

#[tokio::test]
async fn test_missing_claim_is_projection_error() {
    let mock_server = MockServer::start().await;
    mount_discovery(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@example.com"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = fixed_handler(&mock_server.uri())
        .handle("/", &bearer("Bearer abc123"))
        .await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(response.headers.get("x-userinfo-name").is_none());
    assert_eq!(response.failed_stage, Some(Stage::UserInfo));
    assert_eq!(&response.body[..], b"projection error: name");
}

#[tokio::test]
async fn test_discovery_failure_never_reaches_userinfo() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Alice"})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = RelayConfigBuilder::new()
        .issuer_fixed(&mock_server.uri())
        .status_policy(StatusPolicy::Lenient)
        .build()
        .unwrap();
    let response = RelayHandler::new(config)
        .unwrap()
        .handle("/", &bearer("Bearer abc123"))
        .await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.failed_stage, Some(Stage::Discovery));
    assert_eq!(response.furthest_state, FlowState::DiscoveryInFlight);
    assert_eq!(&response.body[..], b"decode error: invalid discovery response");
}

#[tokio::test]
async fn test_strict_policy_reports_upstream_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = fixed_handler(&mock_server.uri())
        .handle("/", &bearer("Bearer abc123"))
        .await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(&response.body[..], b"network error: discovery returned HTTP 503");
}

#[tokio::test]
async fn test_unset_issuer_makes_no_network_calls() {
    let mock_server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = RelayConfigBuilder::new()
        .issuer_source(IssuerSource::Environment {
            variable: "OIDC_SERVER".to_string(),
            value: None,
        })
        .build()
        .unwrap();
    let response = RelayHandler::new(config)
        .unwrap()
        .handle("/", &bearer("Bearer abc123"))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.furthest_state, FlowState::Idle);

    let response = fixed_handler("").handle("/", &bearer("Bearer abc123")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_credential_is_forwarded_byte_for_byte() {
    let mock_server = MockServer::start().await;
    mount_discovery(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Zoë"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let raw = "Bearer  tök en ✓ with spaces".as_bytes();
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_bytes(raw).unwrap());

    let response = fixed_handler(&mock_server.uri()).handle("/", &headers).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.get("x-userinfo-name").unwrap().as_bytes(), "Zoë".as_bytes());

    let requests = mock_server.received_requests().await.unwrap();
    let userinfo = requests
        .iter()
        .find(|request| request.url.path() == "/userinfo")
        .expect("userinfo should have been called");
    assert_eq!(userinfo.headers.get("authorization").unwrap().as_bytes(), raw);
}

#[tokio::test]
async fn test_post_method_and_header_issuer_source() {
    let mock_server = MockServer::start().await;
    mount_discovery(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Alice"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = RelayConfigBuilder::new()
        .issuer_header("Authorization-URL")
        .unwrap()
        .userinfo_method(UserInfoMethod::Post)
        .build()
        .unwrap();
    let mut headers = bearer("Bearer abc123");
    headers.insert(
        HeaderName::from_static("authorization-url"),
        HeaderValue::from_str(&mock_server.uri()).unwrap(),
    );

    let response = RelayHandler::new(config).unwrap().handle("/", &headers).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.get("x-userinfo-name").unwrap(), "Alice");

    let requests = mock_server.received_requests().await.unwrap();
    let userinfo = requests
        .iter()
        .find(|request| request.url.path() == "/userinfo")
        .unwrap();
    assert!(userinfo.headers.get("authorization-url").is_none());
}

#[tokio::test]
async fn test_attributes_mode_returns_full_map() {
    let mock_server = MockServer::start().await;
    mount_discovery(&mock_server).await;
    let claims = json!({
        "sub": "248289761001",
        "name": "Alice",
        "email_verified": true,
        "groups": ["admins"],
        "address": {"country": "NZ"}
    });
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(claims.clone()))
        .mount(&mock_server)
        .await;

    let config = RelayConfigBuilder::new()
        .issuer_fixed(&mock_server.uri())
        .attributes_response()
        .build()
        .unwrap();
    let response = RelayHandler::new(config)
        .unwrap()
        .handle("/", &bearer("Bearer abc123"))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, claims);
}

#[tokio::test]
async fn test_non_object_userinfo_is_decode_error() {
    let mock_server = MockServer::start().await;
    mount_discovery(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[\"Alice\"]"))
        .mount(&mock_server)
        .await;

    let response = fixed_handler(&mock_server.uri())
        .handle("/", &bearer("Bearer abc123"))
        .await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.failed_stage, Some(Stage::UserInfo));
    assert_eq!(&response.body[..], b"decode error: invalid userinfo response");
}

#[tokio::test]
async fn test_rejected_credential_surfaces_as_upstream_status() {
    let mock_server = MockServer::start().await;
    mount_discovery(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("www-authenticate", "Bearer error=\"invalid_token\""),
        )
        .mount(&mock_server)
        .await;

    let response = fixed_handler(&mock_server.uri())
        .handle("/", &bearer("Bearer expired"))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(&response.body[..], b"network error: userinfo returned HTTP 401");
    assert!(response.headers.get("x-userinfo-name").is_none());
}

#[tokio::test]
async fn test_outbound_timeout_maps_to_gateway_timeout() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let config = RelayConfigBuilder::new()
        .issuer_fixed(&mock_server.uri())
        .outbound_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let response = RelayHandler::new(config)
        .unwrap()
        .handle("/", &bearer("Bearer abc123"))
        .await;

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.failed_stage, Some(Stage::Discovery));
}

#[tokio::test]
async fn test_unreachable_provider_is_told_apart_from_invalid_metadata() {
    // Nothing listens on port 1.
    let unreachable = fixed_handler("http://127.0.0.1:1")
        .handle("/", &bearer("Bearer abc123"))
        .await;
    assert_eq!(unreachable.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(&unreachable.body[..], b"network error: discovery request failed");

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": "https://idp.example",
            "authorization_endpoint": "https://idp.example/auth",
            "token_endpoint": "https://idp.example/token",
            "userinfo_endpoint": "https://idp.example/userinfo"
        })))
        .mount(&mock_server)
        .await;
    let invalid = fixed_handler(&mock_server.uri())
        .handle("/", &bearer("Bearer abc123"))
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_GATEWAY);
    assert_eq!(&invalid.body[..], b"validation error: jwks_uri");

    assert_ne!(unreachable.status, invalid.status);
}
