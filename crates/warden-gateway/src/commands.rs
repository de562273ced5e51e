//! Built-in commands, messaging extension and task module.
//!
//! All of them read the signed-in user's profile from the downstream API
//! through the full token chain.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use warden_auth::{DownstreamClient, TokenChainResolver, TokenOutcome};
use warden_bot::cards::ADAPTIVE_CARD_TYPE;
use warden_bot::{
    AugmentedExecutor, CommandDescriptor, CommandHandler, CommandPattern, CommandRouter,
    HandlerError, MessageExtensionHandler, TaskModuleHandler, TurnContext,
};
use warden_channels::Attachment;
use warden_core::WardenError;

pub const HELP_COMMAND: &str = "help";
pub const PROFILE_COMMAND: &str = "profile";

/// Register the built-in commands, in match order.
pub fn register(router: CommandRouter, profiles: Arc<ProfileLookup>) -> Result<CommandRouter, WardenError> {
    let pattern = |re: &str| {
        CommandPattern::regex(re).map_err(|e| WardenError::Config(format!("bad command pattern {re}: {e}")))
    };
    let names = vec![HELP_COMMAND.to_string(), PROFILE_COMMAND.to_string()];
    Ok(router
        .register(CommandDescriptor::new(
            HELP_COMMAND,
            pattern(r"^(help|\?)$")?,
            Arc::new(HelpCommand { names }),
        ))
        .register(
            CommandDescriptor::new(
                PROFILE_COMMAND,
                pattern(r"^(profile|whoami|who am i)\b")?,
                Arc::new(ProfileCommand { profiles }),
            )
            .delegatable(),
        ))
}

/// Downstream profile of a user, via platform → backend → OBO.
pub struct ProfileLookup {
    resolver: Arc<TokenChainResolver>,
    client: Arc<DownstreamClient>,
}

impl ProfileLookup {
    pub fn new(resolver: Arc<TokenChainResolver>, client: Arc<DownstreamClient>) -> Self {
        Self { resolver, client }
    }

    pub async fn fetch(&self, user_id: &str) -> Result<Value, HandlerError> {
        let link = match self.resolver.resolve_downstream(user_id).await {
            TokenOutcome::Token(link) => link,
            TokenOutcome::SigninRequired { hop, reason } => {
                return Err(HandlerError::Token(format!("{hop} hop needs a new sign-in: {reason}")))
            }
            TokenOutcome::Failed(e) => return Err(HandlerError::Token(e.to_string())),
        };
        self.client
            .profile(&link)
            .await
            .map_err(|e| HandlerError::Token(e.to_string()))
    }
}

fn display_name(profile: &Value) -> &str {
    profile
        .get("displayName")
        .and_then(Value::as_str)
        .unwrap_or("unknown user")
}

fn contact(profile: &Value) -> &str {
    ["mail", "userPrincipalName"]
        .iter()
        .find_map(|k| profile.get(*k).and_then(Value::as_str))
        .unwrap_or("no address on file")
}

pub fn profile_card(profile: &Value) -> Attachment {
    Attachment {
        content_type: ADAPTIVE_CARD_TYPE.to_string(),
        content: json!({
            "type": "AdaptiveCard",
            "version": "1.4",
            "fallbackText": "Profile",
            "body": [
                { "type": "TextBlock", "text": display_name(profile), "weight": "Bolder", "size": "Medium" },
                { "type": "TextBlock", "text": contact(profile), "isSubtle": true },
                { "type": "TextBlock", "text": profile.get("jobTitle").and_then(Value::as_str).unwrap_or(""), "wrap": true }
            ]
        }),
    }
}

struct HelpCommand {
    names: Vec<String>,
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn handle(&self, ctx: &TurnContext, _text: &str) -> Result<(), HandlerError> {
        ctx.send_text(format!(
            "Available commands: {}. Send 'logout' to sign out.",
            self.names.join(", ")
        ))
        .await?;
        Ok(())
    }
}

struct ProfileCommand {
    profiles: Arc<ProfileLookup>,
}

#[async_trait]
impl CommandHandler for ProfileCommand {
    async fn handle(&self, ctx: &TurnContext, _text: &str) -> Result<(), HandlerError> {
        let profile = self.profiles.fetch(ctx.user_id()).await?;
        ctx.send_text(format!(
            "You are signed in as {} ({}).",
            display_name(&profile),
            contact(&profile)
        ))
        .await?;
        Ok(())
    }
}

/// Augmented path: answers delegatable commands with a card instead of text.
pub struct ProfileCardExecutor {
    profiles: Arc<ProfileLookup>,
}

impl ProfileCardExecutor {
    pub fn new(profiles: Arc<ProfileLookup>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl AugmentedExecutor for ProfileCardExecutor {
    async fn execute(&self, ctx: &TurnContext, command: &str, _text: &str) -> Result<(), HandlerError> {
        if command != PROFILE_COMMAND {
            return Err(HandlerError::NotFound(command.to_string()));
        }
        let profile = self.profiles.fetch(ctx.user_id()).await?;
        ctx.send_card(profile_card(&profile)).await?;
        Ok(())
    }
}

/// `composeExtension/query` for the profile command: one result card.
pub struct ProfileExtension {
    profiles: Arc<ProfileLookup>,
}

impl ProfileExtension {
    pub fn new(profiles: Arc<ProfileLookup>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl MessageExtensionHandler for ProfileExtension {
    async fn query(&self, ctx: &TurnContext, query: &Value) -> Result<Value, HandlerError> {
        debug!(parameters = %query.get("parameters").unwrap_or(&serde_json::Value::Null), "profile extension query");
        let profile = self.profiles.fetch(ctx.user_id()).await?;
        let card = profile_card(&profile);
        Ok(json!({
            "composeExtension": {
                "type": "result",
                "attachmentLayout": "list",
                "attachments": [{
                    "contentType": card.content_type,
                    "content": card.content,
                    "preview": { "contentType": "application/vnd.microsoft.card.thumbnail", "content": { "title": display_name(&profile) } }
                }]
            }
        }))
    }
}

/// Task module showing the profile card.
pub struct ProfileTask {
    profiles: Arc<ProfileLookup>,
}

impl ProfileTask {
    pub fn new(profiles: Arc<ProfileLookup>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl TaskModuleHandler for ProfileTask {
    async fn fetch(&self, ctx: &TurnContext, _request: &Value) -> Result<Value, HandlerError> {
        let profile = self.profiles.fetch(ctx.user_id()).await?;
        Ok(json!({
            "task": {
                "type": "continue",
                "value": {
                    "title": "Profile",
                    "height": "medium",
                    "width": "medium",
                    "card": profile_card(&profile)
                }
            }
        }))
    }

    async fn submit(&self, _ctx: &TurnContext, _request: &Value) -> Result<Value, HandlerError> {
        Ok(json!({ "task": { "type": "message", "value": "Done." } }))
    }
}
