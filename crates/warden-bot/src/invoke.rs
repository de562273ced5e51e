//! Invoke routing. Every subtype gets a well-formed response, whatever
//! the handler does.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};
use warden_core::{InvokeRequest, WardenError};
use warden_sessions::AuthSession;

use crate::context::TurnContext;
use crate::dialog::AuthenticationDialogEngine;
use crate::error::HandlerError;

/// Messaging-extension handler, resolved by command id.
#[async_trait]
pub trait MessageExtensionHandler: Send + Sync {
    /// Returns the `composeExtension` response body.
    async fn query(&self, ctx: &TurnContext, query: &Value) -> Result<Value, HandlerError>;

    async fn select_item(&self, _ctx: &TurnContext, item: &Value) -> Result<Value, HandlerError> {
        let _ = item;
        Err(HandlerError::NotFound("selectItem".to_string()))
    }
}

/// Task-module handler, resolved by `data.commandId`.
#[async_trait]
pub trait TaskModuleHandler: Send + Sync {
    async fn fetch(&self, ctx: &TurnContext, request: &Value) -> Result<Value, HandlerError>;
    async fn submit(&self, ctx: &TurnContext, request: &Value) -> Result<Value, HandlerError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvokeResponse {
    pub status: u16,
    pub body: Value,
}

impl InvokeResponse {
    pub fn empty() -> Self {
        Self {
            status: 200,
            body: json!({}),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

pub struct InvokeMultiplexer {
    engine: Arc<AuthenticationDialogEngine>,
    extensions: HashMap<String, Arc<dyn MessageExtensionHandler>>,
    tasks: HashMap<String, Arc<dyn TaskModuleHandler>>,
}

impl InvokeMultiplexer {
    pub fn new(engine: Arc<AuthenticationDialogEngine>) -> Self {
        Self {
            engine,
            extensions: HashMap::new(),
            tasks: HashMap::new(),
        }
    }

    pub fn extension(mut self, command_id: impl Into<String>, handler: Arc<dyn MessageExtensionHandler>) -> Self {
        self.extensions.insert(command_id.into(), handler);
        self
    }

    pub fn task(mut self, command_id: impl Into<String>, handler: Arc<dyn TaskModuleHandler>) -> Self {
        self.tasks.insert(command_id.into(), handler);
        self
    }

    /// Route one invoke. Errors and panics are logged once and replaced by
    /// the subtype's empty response.
    pub async fn handle(&self, ctx: &TurnContext, request: &InvokeRequest, session: &mut AuthSession) -> InvokeResponse {
        let subtype = request.subtype().to_string();
        let outcome = AssertUnwindSafe(self.route(ctx, request, session))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(reason)) => {
                let err = WardenError::InvokeHandlerFailure { subtype, reason };
                error!(code = err.code(), request_id = %ctx.request_id(), "{err}");
                InvokeResponse::empty()
            }
            Err(panic) => {
                let err = WardenError::InvokeHandlerFailure {
                    subtype,
                    reason: panic_message(panic.as_ref()),
                };
                error!(code = err.code(), request_id = %ctx.request_id(), panicked = true, "{err}");
                InvokeResponse::empty()
            }
        }
    }

    async fn route(
        &self,
        ctx: &TurnContext,
        request: &InvokeRequest,
        session: &mut AuthSession,
    ) -> Result<InvokeResponse, String> {
        match request {
            InvokeRequest::SigninVerify { .. } | InvokeRequest::SigninTokenExchange { .. } => {
                let outcome = self.engine.run(ctx, session).await.map_err(|e| e.to_string())?;
                debug!(?outcome, "sign-in invoke processed");
                Ok(InvokeResponse::empty())
            }
            InvokeRequest::ExtQuery { command_id, query } => {
                let handler = lookup(&self.extensions, command_id.as_deref())?;
                let body = handler.query(ctx, query).await.map_err(|e| e.to_string())?;
                Ok(InvokeResponse::ok(body))
            }
            InvokeRequest::ExtSelectItem { id, item } => {
                let handler = lookup(&self.extensions, id.as_deref())?;
                let body = handler.select_item(ctx, item).await.map_err(|e| e.to_string())?;
                Ok(InvokeResponse::ok(body))
            }
            InvokeRequest::TaskFetch { command_id, request } => {
                let handler = lookup(&self.tasks, command_id.as_deref())?;
                let body = handler.fetch(ctx, request).await.map_err(|e| e.to_string())?;
                Ok(InvokeResponse::ok(body))
            }
            InvokeRequest::TaskSubmit { command_id, request } => {
                let handler = lookup(&self.tasks, command_id.as_deref())?;
                let body = handler.submit(ctx, request).await.map_err(|e| e.to_string())?;
                Ok(InvokeResponse::ok(body))
            }
            InvokeRequest::Unsupported { name } => {
                debug!(name = %name, "unsupported invoke");
                Ok(InvokeResponse::empty())
            }
        }
    }
}

fn lookup<'a, H: ?Sized>(map: &'a HashMap<String, Arc<H>>, id: Option<&str>) -> Result<&'a Arc<H>, String> {
    let id = id.map(str::trim).filter(|s| !s.is_empty()).ok_or("missing command id")?;
    map.get(id)
        .ok_or_else(|| HandlerError::NotFound(id.to_string()).to_string())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
