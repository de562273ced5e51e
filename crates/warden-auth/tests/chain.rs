//! Token chain behaviour against mocked backend and identity provider.

use std::sync::Arc;

use chrono::{Duration, Utc};
use httpmock::prelude::*;
use serde_json::json;
use warden_auth::{ExchangeError, Hop, MemoryTokenStore, PlatformToken, TokenChainResolver, TokenOutcome};
use warden_core::config::OboAssertion;
use warden_core::WardenConfig;

const OBO_GRANT: &str = "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer";

fn config(server: &MockServer) -> WardenConfig {
    let mut cfg = WardenConfig::default();
    cfg.bot.connection_name = "aad".into();
    cfg.identity.authority = server.base_url();
    cfg.identity.tenant_id = "tenant".into();
    cfg.identity.client_id = "mid-tier".into();
    cfg.identity.client_secret = "s3cret".into();
    cfg.identity.downstream_scope = "api://downstream/.default".into();
    cfg.backend.token_url = server.url("/backend/token");
    cfg.http.retry_base_delay_ms = 1;
    cfg
}

fn store_with(user: &str, token: &str) -> Arc<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new());
    store.insert_token(
        user,
        PlatformToken {
            connection_name: "aad".into(),
            token: token.into(),
            expires_at: Utc::now() + Duration::minutes(30),
        },
    );
    store
}

#[tokio::test]
async fn valid_platform_token_yields_unexpired_downstream_token() {
    let server = MockServer::start();
    let backend = server.mock(|when, then| {
        when.method(POST)
            .path("/backend/token")
            .header("authorization", "Bearer platform-good");
        then.status(200)
            .json_body(json!({"token": "backend-1", "expires_in": 600}));
    });
    let obo = server.mock(|when, then| {
        when.method(POST)
            .path("/tenant/oauth2/v2.0/token")
            .body_includes(OBO_GRANT)
            .body_includes("requested_token_use=on_behalf_of")
            .body_includes("assertion=platform-good")
            .body_includes("client_id=mid-tier");
        then.status(200).json_body(json!({
            "access_token": "downstream-1",
            "scope": "api://downstream/.default",
            "expires_in": 3599,
            "token_type": "Bearer"
        }));
    });

    let resolver =
        TokenChainResolver::from_config(&config(&server), store_with("u1", "platform-good")).unwrap();

    let link = match resolver.resolve_downstream("u1").await {
        TokenOutcome::Token(link) => link,
        other => panic!("expected token, got {other:?}"),
    };
    assert_eq!(link.kind, Hop::Downstream);
    assert_eq!(link.secret(), "downstream-1");
    assert!(link.expires_at > Utc::now());
    assert_eq!(link.scope.as_deref(), Some("api://downstream/.default"));

    // Second lookup is served from the cache.
    assert!(resolver.resolve_downstream("u1").await.is_token());
    backend.assert_calls(1);
    obo.assert_calls(1);
}

#[tokio::test]
async fn invalid_platform_token_never_reaches_identity_provider() {
    let server = MockServer::start();
    let backend = server.mock(|when, then| {
        when.method(POST).path("/backend/token");
        then.status(401).body("expired");
    });
    let obo = server.mock(|when, then| {
        when.method(POST).path("/tenant/oauth2/v2.0/token");
        then.status(200).json_body(json!({"access_token": "never"}));
    });

    let resolver =
        TokenChainResolver::from_config(&config(&server), store_with("u1", "platform-stale")).unwrap();

    match resolver.resolve_downstream("u1").await {
        TokenOutcome::SigninRequired { hop, .. } => assert_eq!(hop, Hop::Backend),
        other => panic!("expected sign-in required, got {other:?}"),
    }
    backend.assert_calls(1);
    obo.assert_calls(0);
}

#[tokio::test]
async fn invalid_grant_evicts_cached_chain() {
    let server = MockServer::start();
    let backend = server.mock(|when, then| {
        when.method(POST).path("/backend/token");
        then.status(200).json_body(json!({"access_token": "backend-1"}));
    });
    let obo = server.mock(|when, then| {
        when.method(POST).path("/tenant/oauth2/v2.0/token");
        then.status(400).json_body(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS50013: Assertion failed signature validation."
        }));
    });

    let mut cfg = config(&server);
    cfg.http.max_attempts = 3;
    let resolver = TokenChainResolver::from_config(&cfg, store_with("u1", "platform-good")).unwrap();

    match resolver.resolve_downstream("u1").await {
        TokenOutcome::SigninRequired { hop, reason } => {
            assert_eq!(hop, Hop::Downstream);
            assert!(reason.contains("invalid_grant"));
        }
        other => panic!("expected sign-in required, got {other:?}"),
    }
    // Not retried with the same assertion, and nothing left cached.
    obo.assert_calls(1);
    backend.assert_calls(1);
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn backend_outage_retried_then_reported_as_failure() {
    let server = MockServer::start();
    let backend = server.mock(|when, then| {
        when.method(POST).path("/backend/token");
        then.status(503).body("maintenance");
    });

    let mut cfg = config(&server);
    cfg.http.max_attempts = 3;
    let resolver = TokenChainResolver::from_config(&cfg, store_with("u1", "platform-good")).unwrap();

    match resolver.resolve_backend("u1").await {
        TokenOutcome::Failed(err) => {
            assert_eq!(err.hop(), Hop::Backend);
            assert!(err.is_retryable());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    backend.assert_calls(3);
}

#[tokio::test]
async fn missing_platform_token_requires_signin_without_network() {
    let server = MockServer::start();
    let backend = server.mock(|when, then| {
        when.method(POST).path("/backend/token");
        then.status(200).json_body(json!({"token": "b"}));
    });
    let resolver =
        TokenChainResolver::from_config(&config(&server), Arc::new(MemoryTokenStore::new())).unwrap();

    match resolver.resolve_downstream("nobody").await {
        TokenOutcome::SigninRequired { hop, .. } => assert_eq!(hop, Hop::Platform),
        other => panic!("expected sign-in required, got {other:?}"),
    }
    backend.assert_calls(0);
}

#[tokio::test]
async fn backend_token_as_assertion_when_configured() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/backend/token");
        then.status(200).json_body(json!({"token": "backend-xyz"}));
    });
    let obo = server.mock(|when, then| {
        when.method(POST)
            .path("/tenant/oauth2/v2.0/token")
            .body_includes("assertion=backend-xyz");
        then.status(200)
            .json_body(json!({"access_token": "down", "expires_in": 60}));
    });

    let mut cfg = config(&server);
    cfg.identity.obo_assertion = OboAssertion::Backend;
    let resolver = TokenChainResolver::from_config(&cfg, store_with("u1", "platform-good")).unwrap();

    assert!(resolver.resolve_downstream("u1").await.is_token());
    obo.assert_calls(1);
}

#[tokio::test]
async fn bearer_chain_for_relay() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/backend/token")
            .header("authorization", "Bearer caller-token");
        then.status(200).json_body(json!({"token": "b"}));
    });
    let obo = server.mock(|when, then| {
        when.method(POST)
            .path("/tenant/oauth2/v2.0/token")
            .body_includes("assertion=caller-token");
        then.status(200)
            .json_body(json!({"access_token": "relay-down", "expires_in": 120}));
    });

    let resolver =
        TokenChainResolver::from_config(&config(&server), Arc::new(MemoryTokenStore::new())).unwrap();
    let link = resolver.resolve_bearer("caller-token").await.unwrap();
    assert_eq!(link.secret(), "relay-down");
    assert!(resolver.cache().is_empty());
    obo.assert_calls(1);
}

#[tokio::test]
async fn out_of_range_backend_lifetime_is_an_invalid_response() {
    let server = MockServer::start();
    let backend = server.mock(|when, then| {
        when.method(POST).path("/backend/token");
        then.status(200)
            .json_body(json!({"token": "backend-1", "expires_in": 10_000_000_000_000u64}));
    });
    let obo = server.mock(|when, then| {
        when.method(POST).path("/tenant/oauth2/v2.0/token");
        then.status(200).json_body(json!({"access_token": "never"}));
    });

    let resolver =
        TokenChainResolver::from_config(&config(&server), store_with("u1", "platform-good")).unwrap();

    match resolver.resolve_downstream("u1").await {
        TokenOutcome::Failed(err @ ExchangeError::InvalidResponse { .. }) => {
            assert_eq!(err.hop(), Hop::Backend);
        }
        other => panic!("expected invalid response, got {other:?}"),
    }
    backend.assert_calls(1);
    obo.assert_calls(0);
    assert!(resolver.cache().get("u1", "aad", Hop::Backend, Utc::now()).is_none());
}

#[tokio::test]
async fn out_of_range_downstream_lifetime_is_an_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/backend/token");
        then.status(200).json_body(json!({"token": "backend-1", "expires_in": 600}));
    });
    let obo = server.mock(|when, then| {
        when.method(POST).path("/tenant/oauth2/v2.0/token");
        then.status(200)
            .json_body(json!({"access_token": "downstream-1", "expires_in": u64::MAX}));
    });

    let resolver =
        TokenChainResolver::from_config(&config(&server), store_with("u1", "platform-good")).unwrap();

    match resolver.resolve_downstream("u1").await {
        TokenOutcome::Failed(err @ ExchangeError::InvalidResponse { .. }) => {
            assert_eq!(err.hop(), Hop::Downstream);
        }
        other => panic!("expected invalid response, got {other:?}"),
    }
    obo.assert_calls(1);
    assert!(resolver.cache().get("u1", "aad", Hop::Downstream, Utc::now()).is_none());
}
