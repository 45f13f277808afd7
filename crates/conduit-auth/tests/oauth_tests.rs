//! OAuth helper tests against a mock authorization server.

use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conduit_auth::{
    PkceChallenge, discover_metadata, exchange_code, fallback_metadata, register_client,
};
use conduit_protocol::Error;

#[tokio::test]
async fn discovery_fetches_well_known_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .and(header("MCP-Protocol-Version", "2025-03-26"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "registration_endpoint": format!("{}/register", server.uri()),
            "scopes_supported": ["mcp:tools"]
        })))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let metadata = discover_metadata(
        &format!("{}/mcp/deep/path", server.uri()),
        "2025-03-26",
        &http,
    )
    .await
    .unwrap();

    assert!(metadata.authorization_endpoint.ends_with("/authorize"));
    assert!(metadata.registration_endpoint.is_some());
    assert!(metadata.extra.contains_key("scopes_supported"));
}

#[tokio::test]
async fn discovery_requires_http_200() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let err = discover_metadata(&server.uri(), "2025-03-26", &http)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn registration_accepts_200_and_201() {
    for status in [200, 201] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .and(body_string_contains("client_name"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "client_id": "generated-id",
                "client_secret": "generated-secret",
                "redirect_uris": ["http://localhost:7777/callback"],
                "client_name": "conduit"
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let registration = register_client(
            &format!("{}/register", server.uri()),
            &["http://localhost:7777/callback".to_string()],
            "conduit",
            &http,
        )
        .await
        .unwrap();

        assert_eq!(registration.client_id, "generated-id");
        assert_eq!(registration.client_secret.as_deref(), Some("generated-secret"));
    }
}

#[tokio::test]
async fn registration_requires_a_redirect_uri() {
    let http = reqwest::Client::new();
    let err = register_client("http://localhost:1/register", &[], "conduit", &http)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "redirect_uris", .. }));
}

#[tokio::test]
async fn code_exchange_posts_the_form_and_decodes_tokens() {
    let server = MockServer::start().await;
    let pkce = PkceChallenge::generate();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains(format!("code_verifier={}", pkce.verifier)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "token-1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-1",
            "scope": "mcp:tools"
        })))
        .mount(&server)
        .await;

    let mut metadata = fallback_metadata(&server.uri()).unwrap();
    metadata.token_endpoint = format!("{}/token", server.uri());

    let http = reqwest::Client::new();
    let tokens = exchange_code(
        &metadata,
        "client-1",
        None,
        "auth-code-1",
        "http://localhost:7777/callback",
        &pkce,
        &http,
    )
    .await
    .unwrap();

    assert_eq!(tokens.access_token, "token-1");
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.expires_in, Some(3600));
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn code_exchange_surfaces_server_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"error": "invalid_grant"})),
        )
        .mount(&server)
        .await;

    let mut metadata = fallback_metadata(&server.uri()).unwrap();
    metadata.token_endpoint = format!("{}/token", server.uri());

    let http = reqwest::Client::new();
    let err = exchange_code(
        &metadata,
        "client-1",
        Some("secret"),
        "expired-code",
        "http://localhost:7777/callback",
        &PkceChallenge::generate(),
        &http,
    )
    .await
    .unwrap_err();

    match err {
        Error::Authentication(message) => assert!(message.contains("invalid_grant")),
        other => panic!("expected authentication error, got {other:?}"),
    }
}
