//! Authorization-code redemption against a mocked token endpoint.

use httpmock::prelude::*;
use serde_json::json;
use warden_auth::pkce::{self, exchange_code};
use warden_auth::AuthError;

#[tokio::test]
async fn redeems_code_with_verifier() {
    let server = MockServer::start();
    let pair = pkce::generate().unwrap();
    let token = server.mock(|when, then| {
        when.method(POST)
            .path("/tenant/oauth2/v2.0/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body_includes("grant_type=authorization_code")
            .body_includes("client_id=spa-app")
            .body_includes("code=auth-code-1")
            .body_includes("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fredirect")
            .body_includes(format!("code_verifier={}", pair.verifier));
        then.status(200).json_body(json!({
            "access_token": "user-access",
            "id_token": "id-1",
            "expires_in": 3600,
            "scope": "openid profile"
        }));
    });

    let tokens = exchange_code(
        &reqwest::Client::new(),
        &server.url("/tenant/oauth2/v2.0/token"),
        "spa-app",
        "http://localhost:3000/redirect",
        "auth-code-1",
        &pair.verifier,
    )
    .await
    .unwrap();

    token.assert();
    assert_eq!(tokens.access_token, "user-access");
    assert_eq!(tokens.id_token.as_deref(), Some("id-1"));
    assert_eq!(tokens.expires_in, 3600);
    assert!(!format!("{tokens:?}").contains("user-access"));
}

#[tokio::test]
async fn rejected_code_reports_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(400).json_body(json!({"error": "invalid_grant"}));
    });

    let err = exchange_code(
        &reqwest::Client::new(),
        &server.url("/token"),
        "spa-app",
        "http://localhost:3000/redirect",
        "used-code",
        "verifier",
    )
    .await
    .unwrap_err();

    match err {
        AuthError::Service { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("invalid_grant"));
        }
        other => panic!("unexpected {other:?}"),
    }
}
