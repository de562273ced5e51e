use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Sign-in progress for one user in one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Idle,
    /// Sign-in card is being sent.
    Prompting,
    /// Card delivered; waiting for a token, a magic code or the deadline.
    AwaitingToken,
    /// A token arrived and is being checked.
    Evaluating,
    Authenticated,
    Failed,
}

impl AuthState {
    /// Whether `self -> to` is an allowed move.
    ///
    /// Any state may be reset to `Idle` (logout, explicit reset).
    pub fn can_transition(self, to: AuthState) -> bool {
        use AuthState::*;
        if to == Idle {
            return true;
        }
        matches!(
            (self, to),
            (Idle, Prompting)
                | (Prompting, AwaitingToken)
                | (Prompting, Evaluating)
                | (AwaitingToken, Evaluating)
                | (AwaitingToken, Failed)
                | (Evaluating, Authenticated)
                | (Evaluating, Failed)
                | (Authenticated, Prompting)
                | (Failed, Prompting)
        )
    }
}

/// Persisted per-(conversation, user) dialog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub state: AuthState,
    /// Set while `AwaitingToken`; the prompt expires at this instant.
    pub prompt_deadline: Option<DateTime<Utc>>,
    /// Last failure reason, cleared on success.
    pub last_error: Option<String>,
    /// The "signed in" message for the current sign-in has been sent.
    #[serde(default)]
    pub success_shown: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self {
            state: AuthState::Idle,
            prompt_deadline: None,
            last_error: None,
            success_shown: false,
            updated_at: Utc::now(),
        }
    }
}

impl AuthSession {
    /// Move to `to`, rejecting moves outside the state table.
    pub fn transition(&mut self, to: AuthState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(StateError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        if to != AuthState::AwaitingToken {
            self.prompt_deadline = None;
        }
        if to == AuthState::Authenticated || to == AuthState::Idle {
            self.last_error = None;
        }
        if to == AuthState::Prompting || to == AuthState::Idle {
            self.success_shown = false;
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enter `AwaitingToken` with a deadline `timeout_ms` from `now`.
    pub fn await_token(&mut self, now: DateTime<Utc>, timeout_ms: u64) -> Result<()> {
        let deadline = i64::try_from(timeout_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|timeout| now.checked_add_signed(timeout))
            .ok_or(StateError::InvalidDeadline { timeout_ms })?;
        self.transition(AuthState::AwaitingToken)?;
        self.prompt_deadline = Some(deadline);
        Ok(())
    }

    /// Move to `Failed` recording `reason`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(AuthState::Failed)?;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// `true` when waiting for a token and the deadline has passed.
    pub fn prompt_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == AuthState::AwaitingToken
            && self.prompt_deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Conversation-scoped state bag. At most one session per user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub sessions: BTreeMap<String, AuthSession>,
}

impl ConversationState {
    pub fn session(&self, user_id: &str) -> Option<&AuthSession> {
        self.sessions.get(user_id)
    }

    pub fn session_mut(&mut self, user_id: &str) -> &mut AuthSession {
        self.sessions.entry(user_id.to_string()).or_default()
    }

    /// Drop the user's session entirely (logout).
    pub fn clear(&mut self, user_id: &str) -> Option<AuthSession> {
        self.sessions.remove(user_id)
    }
}

/// User-scoped state bag, shared across conversations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signin_count: u32,
    pub last_command: Option<String>,
}

impl UserState {
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = Some(now);
    }
}
