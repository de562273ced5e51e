//! Shared wiring for the turn-processing tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use httpmock::prelude::*;
use serde_json::json;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{self, Layer, SubscriberExt};
use warden_auth::{MemoryTokenStore, PlatformToken, TokenChainResolver};
use warden_bot::cards;
use warden_bot::{
    AuthenticationDialogEngine, CommandHandler, CommandRouter, DialogSettings, HandlerError,
    InvokeMultiplexer, TrustPolicy, TurnContext, TurnProcessor,
};
use warden_channels::{BufferedChannel, Channel, OutboundActivity};
use warden_core::WardenConfig;
use warden_sessions::StateStore;

pub const CONNECTION: &str = "aad";

pub fn config(server: &MockServer) -> WardenConfig {
    let mut cfg = WardenConfig::default();
    cfg.bot.connection_name = CONNECTION.into();
    cfg.bot.prompt_timeout_ms = 60_000;
    cfg.identity.authority = server.base_url();
    cfg.identity.tenant_id = "tenant".into();
    cfg.identity.client_id = "mid-tier".into();
    cfg.identity.client_secret = "s3cret".into();
    cfg.identity.downstream_scope = "api://downstream/.default".into();
    cfg.backend.token_url = server.url("/backend/token");
    cfg.http.retry_base_delay_ms = 1;
    cfg
}

/// Backend hop that accepts any platform token.
pub fn mock_backend(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path("/backend/token");
        then.status(200)
            .json_body(json!({"token": "backend-1", "expires_in": 600}));
    })
}

pub fn platform_token(value: &str) -> PlatformToken {
    PlatformToken {
        connection_name: CONNECTION.into(),
        token: value.into(),
        expires_at: Utc::now() + Duration::minutes(30),
    }
}

pub fn engine(cfg: &WardenConfig, tokens: Arc<MemoryTokenStore>) -> Arc<AuthenticationDialogEngine> {
    let resolver = TokenChainResolver::from_config(cfg, tokens).unwrap();
    Arc::new(AuthenticationDialogEngine::new(
        Arc::new(resolver),
        DialogSettings::from_config(&cfg.bot),
    ))
}

pub fn processor(
    cfg: &WardenConfig,
    engine: Arc<AuthenticationDialogEngine>,
    router: CommandRouter,
    state: Arc<dyn StateStore>,
) -> TurnProcessor {
    let invokes = InvokeMultiplexer::new(engine.clone());
    TurnProcessor::new(engine, router, invokes, state, TrustPolicy::from_config(&cfg.bot))
}

pub fn channel() -> (Arc<BufferedChannel>, Arc<dyn Channel>) {
    let buffered = Arc::new(BufferedChannel::new("test"));
    let dynamic: Arc<dyn Channel> = buffered.clone();
    (buffered, dynamic)
}

/// Handler that records its name and replies.
pub struct Recording {
    pub name: &'static str,
    pub hits: Arc<Mutex<Vec<String>>>,
}

impl Recording {
    pub fn new(name: &'static str, hits: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            hits: hits.clone(),
        })
    }
}

#[async_trait]
impl CommandHandler for Recording {
    async fn handle(&self, ctx: &TurnContext, text: &str) -> Result<(), HandlerError> {
        self.hits.lock().unwrap().push(self.name.to_string());
        ctx.send_text(format!("{}: {text}", self.name)).await?;
        Ok(())
    }
}

pub fn texts(sent: &[OutboundActivity]) -> Vec<&str> {
    sent.iter().filter_map(OutboundActivity::as_text).collect()
}

pub fn count_text(sent: &[OutboundActivity], text: &str) -> usize {
    sent.iter().filter(|a| a.as_text() == Some(text)).count()
}

pub fn count_cards(sent: &[OutboundActivity], content_type: &str) -> usize {
    sent.iter().filter(|a| a.card_type() == Some(content_type)).count()
}

pub fn count_fallback(sent: &[OutboundActivity], fallback: &str) -> usize {
    sent.iter()
        .filter(|a| match &a.kind {
            warden_channels::ActivityKind::Card { attachment } => {
                cards::fallback_of(attachment) == Some(fallback)
            }
            _ => false,
        })
        .count()
}

/// One captured tracing event: level plus `name=value` field text.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: String,
}

/// Collects tracing events while installed as the thread's default
/// subscriber. `#[tokio::test]` runs on one thread, so every event of the
/// test body lands here.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<CapturedEvent>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn at(&self, level: Level) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.level == level).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|e| e.fields.contains(needle))
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: layer::Context<'_, S>) {
        let mut fields = FieldText::default();
        event.record(&mut fields);
        self.0.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: fields.0,
        });
    }
}

#[derive(Default)]
struct FieldText(String);

impl Visit for FieldText {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.push_str(&format!("{}={:?} ", field.name(), value));
    }
}
