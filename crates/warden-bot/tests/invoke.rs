//! Invoke subtypes always answer, whatever their handler does.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tracing::Level;
use warden_auth::{AuthError, MemoryTokenStore, PlatformToken, TokenChainResolver, TokenStore};
use warden_bot::{
    AuthenticationDialogEngine, CommandRouter, DialogSettings, HandlerError, InvokeMultiplexer,
    InvokeResponse, MessageExtensionHandler, StaticSettings, TaskModuleHandler, TrustPolicy,
    TurnContext, TurnProcessor,
};
use warden_core::{ConversationTurn, InvokeRequest};
use warden_sessions::MemoryStateStore;

use common::*;

#[derive(Clone, Copy, Debug)]
enum Mode {
    Succeed,
    Fail,
    Panic,
}

fn act(mode: Mode, label: &str) -> Result<Value, HandlerError> {
    match mode {
        Mode::Succeed => Ok(json!({"handled": label})),
        Mode::Fail => Err(HandlerError::Failed(format!("{label} exploded"))),
        Mode::Panic => panic!("{label} panicked"),
    }
}

struct Extension(Mode);

#[async_trait]
impl MessageExtensionHandler for Extension {
    async fn query(&self, _ctx: &TurnContext, _query: &Value) -> Result<Value, HandlerError> {
        act(self.0, "query")
    }

    async fn select_item(&self, _ctx: &TurnContext, _item: &Value) -> Result<Value, HandlerError> {
        act(self.0, "selectItem")
    }
}

struct Task(Mode);

#[async_trait]
impl TaskModuleHandler for Task {
    async fn fetch(&self, _ctx: &TurnContext, _request: &Value) -> Result<Value, HandlerError> {
        act(self.0, "fetch")
    }

    async fn submit(&self, _ctx: &TurnContext, _request: &Value) -> Result<Value, HandlerError> {
        act(self.0, "submit")
    }
}

/// Token service that is down for every call.
struct UnreachableTokenService;

#[async_trait]
impl TokenStore for UnreachableTokenService {
    async fn get_token(
        &self,
        _user_id: &str,
        _connection: &str,
        _magic_code: Option<&str>,
    ) -> Result<Option<PlatformToken>, AuthError> {
        Err(AuthError::Service {
            status: 502,
            message: "bad gateway".into(),
        })
    }

    async fn exchange_token(
        &self,
        _user_id: &str,
        _connection: &str,
        _exchangeable: &str,
    ) -> Result<Option<PlatformToken>, AuthError> {
        Err(AuthError::Service {
            status: 502,
            message: "bad gateway".into(),
        })
    }

    async fn sign_out(&self, _user_id: &str, _connection: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

fn build(server: &MockServer, mode: Mode, tokens: Arc<dyn TokenStore>) -> TurnProcessor {
    let cfg = config(server);
    let resolver = TokenChainResolver::from_config(&cfg, tokens).unwrap();
    let engine = Arc::new(AuthenticationDialogEngine::new(
        Arc::new(resolver),
        DialogSettings::from_config(&cfg.bot),
    ));
    let invokes = InvokeMultiplexer::new(engine.clone())
        .extension("search", Arc::new(Extension(mode)))
        .task("approve", Arc::new(Task(mode)));
    TurnProcessor::new(
        engine,
        CommandRouter::new(Arc::new(StaticSettings::new())),
        invokes,
        Arc::new(MemoryStateStore::new()),
        TrustPolicy::from_config(&cfg.bot),
    )
}

fn handler_invokes() -> Vec<InvokeRequest> {
    vec![
        InvokeRequest::from_activity(
            "composeExtension/query",
            &json!({"commandId": "search", "parameters": [{"name": "q", "value": "rust"}]}),
        ),
        InvokeRequest::from_activity("composeExtension/selectItem", &json!({"id": "search"})),
        InvokeRequest::from_activity("task/fetch", &json!({"data": {"commandId": "approve"}})),
        InvokeRequest::from_activity("task/submit", &json!({"data": {"commandId": "approve"}})),
    ]
}

#[tokio::test]
async fn handler_results_are_returned_as_invoke_bodies() {
    let server = MockServer::start();
    let processor = build(&server, Mode::Succeed, Arc::new(MemoryTokenStore::new()));

    let expected = ["query", "selectItem", "fetch", "submit"];
    for (request, label) in handler_invokes().into_iter().zip(expected) {
        let (_buffered, channel) = channel();
        let report = processor
            .process(ConversationTurn::invoke("c1", "u1", request), channel)
            .await
            .unwrap();
        assert_eq!(
            report.invoke_response,
            Some(InvokeResponse::ok(json!({"handled": label})))
        );
    }
}

#[tokio::test]
async fn failing_and_panicking_handlers_yield_empty_responses() {
    let server = MockServer::start();
    for mode in [Mode::Fail, Mode::Panic] {
        let processor = build(&server, mode, Arc::new(MemoryTokenStore::new()));
        for request in handler_invokes() {
            let subtype = request.subtype().to_string();
            let (buffered, channel) = channel();
            let logs = LogCapture::default();
            let guard = logs.install();
            let report = processor
                .process(ConversationTurn::invoke("c1", "u1", request), channel)
                .await
                .unwrap_or_else(|e| panic!("{mode:?} {subtype}: {e}"));
            drop(guard);
            assert_eq!(
                report.invoke_response,
                Some(InvokeResponse::empty()),
                "{mode:?} {subtype}"
            );
            assert!(buffered.sent().is_empty());

            let errors = logs.at(Level::ERROR);
            assert_eq!(errors.len(), 1, "{mode:?} {subtype}: {errors:?}");
            assert!(errors[0].fields.contains("INVOKE_HANDLER_FAILURE"));
            assert!(errors[0].fields.contains(&subtype), "{errors:?}");
        }
    }
}

#[tokio::test]
async fn signin_invokes_answer_even_when_token_service_is_down() {
    let server = MockServer::start();
    let processor = build(&server, Mode::Succeed, Arc::new(UnreachableTokenService));

    let requests = [
        InvokeRequest::from_activity("signin/verifyState", &json!({"state": "123456"})),
        InvokeRequest::from_activity(
            "signin/tokenExchange",
            &json!({"id": "x", "connectionName": CONNECTION, "token": "sso"}),
        ),
    ];
    for request in requests {
        let (_buffered, channel) = channel();
        let report = processor
            .process(ConversationTurn::invoke("c1", "u1", request), channel)
            .await
            .unwrap();
        assert_eq!(report.invoke_response, Some(InvokeResponse::empty()));
    }
}

#[tokio::test]
async fn unknown_handler_and_unsupported_invoke_are_empty() {
    let server = MockServer::start();
    let processor = build(&server, Mode::Succeed, Arc::new(MemoryTokenStore::new()));

    let requests = [
        InvokeRequest::from_activity("task/fetch", &json!({"data": {"commandId": "nope"}})),
        InvokeRequest::from_activity("composeExtension/query", &json!({})),
        InvokeRequest::from_activity("adaptiveCard/action", &json!({"verb": "x"})),
    ];
    for request in requests {
        let (_buffered, channel) = channel();
        let report = processor
            .process(ConversationTurn::invoke("c1", "u1", request), channel)
            .await
            .unwrap();
        let response = report.invoke_response.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({}));
    }
}
