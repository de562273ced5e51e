use thiserror::Error;
use warden_auth::{AuthError, ExchangeError};
use warden_channels::ChannelError;
use warden_core::WardenError;
use warden_sessions::StateError;

/// Failure inside a command, extension or task-module handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("no handler registered for '{0}'")]
    NotFound(String),

    #[error("token unavailable: {0}")]
    Token(String),

    #[error("reply failed: {0}")]
    Channel(#[from] ChannelError),
}

/// A matched command whose handler returned an error.
#[derive(Debug, Error)]
#[error("command '{name}' failed: {error}")]
pub struct DispatchFailure {
    pub name: String,
    #[source]
    pub error: HandlerError,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("settings service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unparseable settings response: {0}")]
    Parse(String),

    #[error("no bearer token available for settings lookup")]
    NoToken,
}

/// Errors that end a turn early.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("reply failed: {0}")]
    Channel(#[from] ChannelError),

    #[error("conversation state: {0}")]
    State(#[from] StateError),

    /// Committed conversation state, then failed to commit user state.
    #[error("user state commit failed: {0}")]
    UserCommit(#[source] StateError),

    #[error("token chain: {0}")]
    Chain(#[from] ExchangeError),

    #[error("token store: {0}")]
    TokenStore(#[from] AuthError),
}

impl From<TurnError> for WardenError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Channel(e) => WardenError::Channel {
                channel: "reply".to_string(),
                reason: e.to_string(),
            },
            TurnError::Chain(e) => e.into(),
            other => WardenError::State(other.to_string()),
        }
    }
}
