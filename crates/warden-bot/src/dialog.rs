//! Per-(conversation, user) sign-in dialog.
//!
//! Every state change goes through `AuthSession::transition`, which enforces
//! the transition table in `warden-sessions`. The engine suspends by
//! returning [`AuthOutcome::Pending`]; the next turn for the same user
//! resumes from the persisted session.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use warden_auth::{Hop, TokenChainLink, TokenChainResolver, TokenOutcome};
use warden_core::config::BotConfig;
use warden_core::{InvokeRequest, WardenError};
use warden_sessions::{AuthSession, AuthState, ConversationState};

use crate::cards;
use crate::context::TurnContext;
use crate::error::TurnError;

/// Prompt wording and wait budget.
#[derive(Debug, Clone)]
pub struct DialogSettings {
    pub connection_name: String,
    pub signin_text: String,
    pub signin_button: String,
    pub prompt_timeout_ms: u64,
}

impl DialogSettings {
    pub fn from_config(bot: &BotConfig) -> Self {
        Self {
            connection_name: bot.connection_name.clone(),
            signin_text: bot.signin_text.clone(),
            signin_button: bot.signin_button.clone(),
            prompt_timeout_ms: bot.prompt_timeout_ms,
        }
    }
}

/// Where authentication stands at the end of `run`.
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated { backend: TokenChainLink },
    /// Sign-in card is out; waiting for the user.
    Pending,
    /// The prompt expired before a token arrived.
    TimedOut,
    /// Sign-in finished without a token.
    Failed,
    /// A hop rejected the user's token; the user has to sign in again.
    SigninRequired { hop: Hop },
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated { .. })
    }
}

pub struct AuthenticationDialogEngine {
    resolver: Arc<TokenChainResolver>,
    settings: DialogSettings,
}

impl AuthenticationDialogEngine {
    pub fn new(resolver: Arc<TokenChainResolver>, settings: DialogSettings) -> Self {
        Self { resolver, settings }
    }

    pub fn resolver(&self) -> &Arc<TokenChainResolver> {
        &self.resolver
    }

    /// Advance the user's sign-in dialog by one turn.
    ///
    /// An `Authenticated` session with a valid cached chain is a silent
    /// no-op; nothing is sent and no prompt is issued.
    #[instrument(
        skip_all,
        fields(conversation = %ctx.conversation_id(), user = %ctx.user_id(), state = ?session.state)
    )]
    pub async fn run(&self, ctx: &TurnContext, session: &mut AuthSession) -> Result<AuthOutcome, TurnError> {
        if session.prompt_expired(Utc::now()) {
            let waited_ms = self.settings.prompt_timeout_ms;
            warn!(waited_ms, "sign-in prompt expired");
            session.fail(WardenError::AuthTimeout { waited_ms }.to_string())?;
            self.send_login_failed(ctx).await?;
            return Ok(AuthOutcome::TimedOut);
        }

        match session.state {
            AuthState::AwaitingToken => self.continue_prompt(ctx, session).await,
            AuthState::Authenticated => self.refresh(ctx, session).await,
            AuthState::Idle | AuthState::Failed => {
                session.transition(AuthState::Prompting)?;
                self.prompt(ctx, session).await
            }
            AuthState::Prompting | AuthState::Evaluating => {
                // An earlier turn stopped mid-step; start over.
                debug!("restarting interrupted dialog");
                session.transition(AuthState::Idle)?;
                session.transition(AuthState::Prompting)?;
                self.prompt(ctx, session).await
            }
        }
    }

    /// Sign the user out everywhere and reset their session.
    #[instrument(skip_all, fields(conversation = %ctx.conversation_id(), user = %ctx.user_id()))]
    pub async fn sign_out(&self, ctx: &TurnContext, state: &mut ConversationState) -> Result<(), TurnError> {
        let user = ctx.user_id();
        if let Err(e) = self
            .resolver
            .store()
            .sign_out(user, &self.settings.connection_name)
            .await
        {
            warn!(error = %e, "token service sign-out failed, clearing local state anyway");
        }
        self.resolver.forget(user);
        state.clear(user);
        info!("user signed out");
        ctx.send_text(cards::SIGNED_OUT_TEXT).await?;
        Ok(())
    }

    /// `Prompting`: use a delivered or cached token, else send the card.
    async fn prompt(&self, ctx: &TurnContext, session: &mut AuthSession) -> Result<AuthOutcome, TurnError> {
        if let Some(token) = self.delivered_token(ctx).await? {
            session.transition(AuthState::Evaluating)?;
            return self.evaluate(ctx, session, Some(token), false).await;
        }

        match self.resolver.platform(ctx.user_id()).await {
            TokenOutcome::Token(link) => {
                debug!("platform token cached, skipping prompt");
                session.transition(AuthState::Evaluating)?;
                self.evaluate(ctx, session, Some(link), false).await
            }
            TokenOutcome::SigninRequired { .. } => {
                ctx.send_card(cards::oauth_card(
                    &self.settings.connection_name,
                    &self.settings.signin_text,
                    &self.settings.signin_button,
                ))
                .await?;
                session.await_token(Utc::now(), self.settings.prompt_timeout_ms)?;
                info!(timeout_ms = self.settings.prompt_timeout_ms, "sign-in prompt sent");
                Ok(AuthOutcome::Pending)
            }
            TokenOutcome::Failed(e) => {
                session.transition(AuthState::Idle)?;
                Err(e.into())
            }
        }
    }

    /// `AwaitingToken`: accept a delivered token or keep waiting.
    async fn continue_prompt(&self, ctx: &TurnContext, session: &mut AuthSession) -> Result<AuthOutcome, TurnError> {
        let attempted = is_token_delivery(ctx);
        match self.delivered_token(ctx).await? {
            Some(token) => {
                session.transition(AuthState::Evaluating)?;
                self.evaluate(ctx, session, Some(token), true).await
            }
            None if attempted => {
                session.transition(AuthState::Evaluating)?;
                self.evaluate(ctx, session, None, true).await
            }
            None => {
                debug!("prompt outstanding, resuming without re-prompting");
                Ok(AuthOutcome::Pending)
            }
        }
    }

    /// `Authenticated`: confirm the chain still resolves.
    async fn refresh(&self, ctx: &TurnContext, session: &mut AuthSession) -> Result<AuthOutcome, TurnError> {
        match self.resolver.resolve_backend(ctx.user_id()).await {
            TokenOutcome::Token(backend) => Ok(AuthOutcome::Authenticated { backend }),
            TokenOutcome::SigninRequired { hop, reason } => {
                info!(%hop, %reason, "stored sign-in no longer valid");
                if hop != Hop::Platform {
                    self.drop_stale_token(ctx.user_id()).await;
                }
                session.transition(AuthState::Prompting)?;
                self.prompt(ctx, session).await
            }
            TokenOutcome::Failed(e) => Err(e.into()),
        }
    }

    /// `Evaluating`: run the backend hop on the delivered token.
    async fn evaluate(
        &self,
        ctx: &TurnContext,
        session: &mut AuthSession,
        token: Option<TokenChainLink>,
        announce: bool,
    ) -> Result<AuthOutcome, TurnError> {
        let Some(platform) = token.filter(|t| !t.secret().is_empty()) else {
            warn!("sign-in finished without a token");
            session.fail(WardenError::TokenMissing.to_string())?;
            self.send_login_failed(ctx).await?;
            return Ok(AuthOutcome::Failed);
        };

        match self.resolver.backend(ctx.user_id(), &platform).await {
            TokenOutcome::Token(backend) => {
                session.transition(AuthState::Authenticated)?;
                if announce && !session.success_shown {
                    ctx.send_text(cards::SIGNED_IN_TEXT).await?;
                    session.success_shown = true;
                }
                info!(announced = announce, "user authenticated");
                Ok(AuthOutcome::Authenticated { backend })
            }
            TokenOutcome::SigninRequired { hop, reason } => {
                session.fail(reason)?;
                self.drop_stale_token(ctx.user_id()).await;
                ctx.send_card(cards::signin_required_card()).await?;
                Ok(AuthOutcome::SigninRequired { hop })
            }
            TokenOutcome::Failed(e) => {
                session.fail(e.to_string())?;
                Err(e.into())
            }
        }
    }

    /// Token carried by this turn: SSO exchange, verify-state, or a typed
    /// magic code. Redeemed tokens are cached for the chain.
    async fn delivered_token(&self, ctx: &TurnContext) -> Result<Option<TokenChainLink>, TurnError> {
        let user = ctx.user_id();
        let connection = self.settings.connection_name.as_str();
        let store = self.resolver.store();

        let token = match &ctx.turn().invoke {
            Some(InvokeRequest::SigninTokenExchange { token: Some(t), .. }) if !t.is_empty() => {
                store.exchange_token(user, connection, t).await?
            }
            Some(InvokeRequest::SigninVerify { state }) => {
                let code = state.as_deref().filter(|s| !s.is_empty());
                store.get_token(user, connection, code).await?
            }
            Some(_) => None,
            None => match ctx.turn().normalized_text() {
                Some(text) if is_magic_code(&text) => store.get_token(user, connection, Some(&text)).await?,
                _ => None,
            },
        };

        Ok(token
            .filter(|t| !t.token.is_empty())
            .map(|t| self.resolver.remember_platform(user, t)))
    }

    async fn drop_stale_token(&self, user: &str) {
        if let Err(e) = self
            .resolver
            .store()
            .sign_out(user, &self.settings.connection_name)
            .await
        {
            warn!(error = %e, "could not clear stale platform token");
        }
        self.resolver.forget(user);
    }

    async fn send_login_failed(&self, ctx: &TurnContext) -> Result<(), TurnError> {
        ctx.send_text(cards::LOGIN_FAILED_TEXT).await?;
        ctx.send_card(cards::consent_card()).await?;
        Ok(())
    }
}

/// The turn is an explicit attempt to hand over a token.
fn is_token_delivery(ctx: &TurnContext) -> bool {
    match &ctx.turn().invoke {
        Some(req) => req.is_signin(),
        None => ctx
            .turn()
            .normalized_text()
            .is_some_and(|t| is_magic_code(&t)),
    }
}

/// Six ASCII digits, as issued by the platform's sign-in page.
fn is_magic_code(text: &str) -> bool {
    text.len() == 6 && text.bytes().all(|b| b.is_ascii_digit())
}
