//! Turn orchestration: authenticate, dispatch, commit.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use warden_auth::TokenOutcome;
use warden_channels::Channel;
use warden_core::config::BotConfig;
use warden_core::ConversationTurn;
use warden_sessions::{AuthSession, AuthState, ConversationState, StateError, StateStore, UserState};

use crate::cards;
use crate::context::TurnContext;
use crate::dialog::{AuthOutcome, AuthenticationDialogEngine};
use crate::error::TurnError;
use crate::invoke::{InvokeMultiplexer, InvokeResponse};
use crate::queue::ConversationQueue;
use crate::router::{CommandRouter, DispatchOutcome};

const DEFAULT_COMMIT_ATTEMPTS: u32 = 3;
const COMMIT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Identities that skip authentication.
#[derive(Debug, Clone, Default)]
pub struct TrustPolicy {
    local_mode: bool,
    ids: HashSet<String>,
}

impl TrustPolicy {
    pub fn from_config(bot: &BotConfig) -> Self {
        Self {
            local_mode: bot.local_mode,
            ids: bot.trusted_ids.iter().cloned().collect(),
        }
    }

    pub fn is_trusted(&self, turn: &ConversationTurn) -> bool {
        self.local_mode || self.ids.contains(&turn.recipient_id) || self.ids.contains(&turn.sender_id)
    }
}

/// What happened during one turn.
#[derive(Debug, Default)]
pub struct TurnReport {
    /// `None` when authentication was skipped or never reached.
    pub auth: Option<AuthOutcome>,
    pub dispatch: Option<DispatchOutcome>,
    pub invoke_response: Option<InvokeResponse>,
    /// Set for consent turns: whether the thank-you card went out.
    pub consent: Option<bool>,
}

pub struct TurnProcessor {
    engine: Arc<AuthenticationDialogEngine>,
    router: CommandRouter,
    invokes: InvokeMultiplexer,
    state: Arc<dyn StateStore>,
    queue: ConversationQueue,
    trust: TrustPolicy,
    commit_attempts: u32,
}

impl TurnProcessor {
    pub fn new(
        engine: Arc<AuthenticationDialogEngine>,
        router: CommandRouter,
        invokes: InvokeMultiplexer,
        state: Arc<dyn StateStore>,
        trust: TrustPolicy,
    ) -> Self {
        Self {
            engine,
            router,
            invokes,
            state,
            queue: ConversationQueue::new(),
            trust,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }

    pub fn with_commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts.max(1);
        self
    }

    pub fn engine(&self) -> &Arc<AuthenticationDialogEngine> {
        &self.engine
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Process one turn. Turns for the same conversation run one at a time.
    pub async fn process(&self, turn: ConversationTurn, channel: Arc<dyn Channel>) -> Result<TurnReport, TurnError> {
        let conversation_id = turn.conversation_id.clone();
        let span = info_span!(
            "turn",
            request_id = %turn.request_id,
            conversation = %conversation_id,
            kind = ?turn.kind()
        );
        async move {
            let _slot = self.queue.acquire(&conversation_id).await;
            self.process_locked(TurnContext::new(turn, channel)).await
        }
        .instrument(span)
        .await
    }

    async fn process_locked(&self, ctx: TurnContext) -> Result<TurnReport, TurnError> {
        let conversation_id = ctx.conversation_id().to_string();
        let user_id = ctx.user_id().to_string();

        let mut conversation = self.state.load_conversation(&conversation_id).await?;
        let mut user = self.state.load_user(&user_id).await?;
        let was_authenticated = is_authenticated(&conversation, &user_id);
        user.touch(Utc::now());

        let mut report = TurnReport::default();
        let body = match ctx.turn().invoke.clone() {
            Some(request) => {
                let response = if request.is_signin() {
                    let session = conversation.session_mut(&user_id);
                    self.invokes.handle(&ctx, &request, session).await
                } else {
                    let mut scratch = AuthSession::default();
                    self.invokes.handle(&ctx, &request, &mut scratch).await
                };
                report.invoke_response = Some(response);
                Ok(())
            }
            None => {
                self.process_message(&ctx, &mut conversation, &mut user, &mut report)
                    .await
            }
        };

        if !was_authenticated && is_authenticated(&conversation, &user_id) {
            user.signin_count += 1;
        }

        self.commit(&conversation_id, &conversation, &user_id, &user).await?;
        body?;
        Ok(report)
    }

    async fn process_message(
        &self,
        ctx: &TurnContext,
        conversation: &mut ConversationState,
        user: &mut UserState,
        report: &mut TurnReport,
    ) -> Result<(), TurnError> {
        if let Some(keyword) = ctx.turn().command_text().filter(|t| CommandRouter::is_reserved(t)) {
            self.engine.sign_out(ctx, conversation).await?;
            report.dispatch = Some(DispatchOutcome::Reserved(keyword));
            return Ok(());
        }

        let trusted = self.trust.is_trusted(ctx.turn());
        let backend = if trusted {
            debug!("trusted identity, authentication skipped");
            None
        } else {
            let session = conversation.session_mut(ctx.user_id());
            let outcome = match self.engine.run(ctx, session).await {
                Ok(outcome) => outcome,
                Err(e @ (TurnError::Chain(_) | TurnError::TokenStore(_))) => {
                    error!(error = %e, "sign-in service unavailable");
                    ctx.send_text(cards::CHAIN_UNAVAILABLE_TEXT).await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let backend = match &outcome {
                AuthOutcome::Authenticated { backend } => Some(backend.clone()),
                _ => None,
            };
            report.auth = Some(outcome);
            backend
        };

        if ctx
            .turn()
            .command_id()
            .is_some_and(|id| id.eq_ignore_ascii_case(cards::CONSENT_COMMAND_ID))
        {
            report.consent = Some(self.consent(ctx).await?);
            return Ok(());
        }

        if !trusted && backend.is_none() {
            debug!("not authenticated, dispatch skipped");
            return Ok(());
        }

        ctx.send_typing().await?;
        match self.router.dispatch(ctx, backend.as_ref()).await {
            Ok(outcome) => {
                if let DispatchOutcome::Handled { name, .. } = &outcome {
                    user.last_command = Some(name.clone());
                }
                report.dispatch = Some(outcome);
            }
            Err(failure) => {
                error!(command = %failure.name, error = %failure.error, "command failed");
                ctx.send_text(format!(
                    "Sorry, '{}' could not be completed. Please try again.",
                    failure.name
                ))
                .await?;
            }
        }
        Ok(())
    }

    /// Consent card submit: confirm the backend hop works and thank the user.
    async fn consent(&self, ctx: &TurnContext) -> Result<bool, TurnError> {
        match self.engine.resolver().resolve_backend(ctx.user_id()).await {
            TokenOutcome::Token(_) => {
                info!("consent confirmed");
                ctx.send_card(cards::thank_you_card()).await?;
                Ok(true)
            }
            TokenOutcome::SigninRequired { hop, reason } => {
                warn!(%hop, %reason, "consent: no usable token");
                Ok(false)
            }
            TokenOutcome::Failed(e) => {
                warn!(error = %e, "consent: backend exchange failed");
                Ok(false)
            }
        }
    }

    /// Conversation state first, then user state. A failed conversation
    /// commit skips the user commit; a failed user commit leaves the
    /// conversation commit in place.
    async fn commit(
        &self,
        conversation_id: &str,
        conversation: &ConversationState,
        user_id: &str,
        user: &UserState,
    ) -> Result<(), TurnError> {
        self.retry_commit("conversation", || {
            self.state.save_conversation(conversation_id, conversation)
        })
        .await
        .map_err(TurnError::State)?;

        self.retry_commit("user", || self.state.save_user(user_id, user))
            .await
            .map_err(TurnError::UserCommit)
    }

    async fn retry_commit<F, Fut>(&self, scope: &'static str, mut op: F) -> Result<(), StateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), StateError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.commit_attempts => {
                    warn!(scope, attempt, error = %e, "state commit failed, retrying");
                    tokio::time::sleep(COMMIT_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(scope, attempt, error = %e, "state commit failed");
                    return Err(e);
                }
            }
        }
    }
}

fn is_authenticated(conversation: &ConversationState, user_id: &str) -> bool {
    conversation
        .session(user_id)
        .is_some_and(|s| s.state == AuthState::Authenticated)
}
