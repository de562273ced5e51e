//! Ordered command dispatch for message turns.

use std::sync::Arc;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};
use warden_auth::TokenChainLink;

use crate::context::TurnContext;
use crate::error::{DispatchFailure, HandlerError};
use crate::settings::{SettingsRequest, SettingsSource};

/// Keywords the platform runtime owns. Never forwarded to handlers.
pub const RESERVED_KEYWORDS: &[&str] = &["logout"];

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// `text` is the normalized command text (or the command id).
    async fn handle(&self, ctx: &TurnContext, text: &str) -> Result<(), HandlerError>;
}

/// Alternate execution path for delegatable commands.
#[async_trait]
pub trait AugmentedExecutor: Send + Sync {
    async fn execute(&self, ctx: &TurnContext, command: &str, text: &str) -> Result<(), HandlerError>;
}

pub enum CommandPattern {
    Regex(Regex),
    /// Whole-text keyword, compared case-insensitively.
    Exact(String),
}

impl CommandPattern {
    /// Case-insensitive regular expression.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(CommandPattern::Regex(
            RegexBuilder::new(pattern).case_insensitive(true).build()?,
        ))
    }

    pub fn exact(keyword: impl Into<String>) -> Self {
        CommandPattern::Exact(keyword.into())
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            CommandPattern::Regex(re) => re.is_match(text),
            CommandPattern::Exact(k) => text.eq_ignore_ascii_case(k),
        }
    }
}

pub struct CommandDescriptor {
    pub name: String,
    pub pattern: CommandPattern,
    pub handler: Arc<dyn CommandHandler>,
    /// May be routed to the augmented executor when the feature flag allows.
    pub delegatable: bool,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, pattern: CommandPattern, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            pattern,
            handler,
            delegatable: false,
        }
    }

    pub fn delegatable(mut self) -> Self {
        self.delegatable = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    Direct,
    Augmented,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Platform-reserved keyword; no handler ran.
    Reserved(String),
    /// Nothing matched. Not an error.
    Miss,
    Handled { name: String, path: DispatchPath },
}

struct Augmented {
    executor: Arc<dyn AugmentedExecutor>,
    enabled: bool,
    setting_key: String,
}

/// First-match-wins router over registered commands.
///
/// The descriptor list is fixed once the router is built and is read
/// without locking.
pub struct CommandRouter {
    commands: Vec<CommandDescriptor>,
    settings: Arc<dyn SettingsSource>,
    augmented: Option<Augmented>,
}

impl CommandRouter {
    pub fn new(settings: Arc<dyn SettingsSource>) -> Self {
        Self {
            commands: Vec::new(),
            settings,
            augmented: None,
        }
    }

    /// Append a command; earlier registrations win ties.
    pub fn register(mut self, descriptor: CommandDescriptor) -> Self {
        self.commands.push(descriptor);
        self
    }

    /// Enable the augmented path. `enabled` is the process-level toggle;
    /// `setting_key` is the per-user flag consulted on each dispatch.
    pub fn with_augmented(
        mut self,
        executor: Arc<dyn AugmentedExecutor>,
        enabled: bool,
        setting_key: impl Into<String>,
    ) -> Self {
        self.augmented = Some(Augmented {
            executor,
            enabled,
            setting_key: setting_key.into(),
        });
        self
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name.as_str())
    }

    pub fn is_reserved(text: &str) -> bool {
        RESERVED_KEYWORDS.iter().any(|k| text.eq_ignore_ascii_case(k))
    }

    /// Route the turn to at most one handler.
    pub async fn dispatch(
        &self,
        ctx: &TurnContext,
        backend: Option<&TokenChainLink>,
    ) -> Result<DispatchOutcome, DispatchFailure> {
        let turn = ctx.turn();
        let Some(text) = turn.command_text() else {
            debug!("nothing to dispatch");
            return Ok(DispatchOutcome::Miss);
        };

        if Self::is_reserved(&text) {
            warn!(keyword = %text.to_ascii_lowercase(), "reserved platform command, not dispatched");
            return Ok(DispatchOutcome::Reserved(text));
        }

        let Some(command) = self.commands.iter().find(|c| c.pattern.matches(&text)) else {
            debug!(text_len = text.len(), "no command matched");
            return Ok(DispatchOutcome::Miss);
        };

        let path = self.choose_path(ctx, command, backend).await;
        info!(command = %command.name, ?path, "dispatching command");

        let result = match (path, &self.augmented) {
            (DispatchPath::Augmented, Some(aug)) => aug.executor.execute(ctx, &command.name, &text).await,
            _ => command.handler.handle(ctx, &text).await,
        };
        result.map_err(|error| DispatchFailure {
            name: command.name.clone(),
            error,
        })?;

        Ok(DispatchOutcome::Handled {
            name: command.name.clone(),
            path,
        })
    }

    async fn choose_path(
        &self,
        ctx: &TurnContext,
        command: &CommandDescriptor,
        backend: Option<&TokenChainLink>,
    ) -> DispatchPath {
        let Some(aug) = self.augmented.as_ref().filter(|a| a.enabled) else {
            return DispatchPath::Direct;
        };
        if !command.delegatable {
            return DispatchPath::Direct;
        }
        let req = SettingsRequest {
            user_id: ctx.user_id(),
            bearer: backend.map(TokenChainLink::secret),
        };
        match self.settings.flag(&aug.setting_key, &req).await {
            Ok(true) => DispatchPath::Augmented,
            Ok(false) => DispatchPath::Direct,
            Err(e) => {
                warn!(error = %e, key = %aug.setting_key, "settings lookup failed, using direct path");
                DispatchPath::Direct
            }
        }
    }
}
