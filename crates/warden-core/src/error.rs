use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sign-in prompt expired after {waited_ms}ms")]
    AuthTimeout { waited_ms: u64 },

    #[error("No sign-in token was delivered")]
    TokenMissing,

    #[error("Token exchange failed at {hop} hop (recoverable: {recoverable}): {reason}")]
    ChainExchange {
        hop: String,
        recoverable: bool,
        reason: String,
    },

    #[error("Invoke handler failed ({subtype}): {reason}")]
    InvokeHandlerFailure { subtype: String, reason: String },

    #[error("State store error: {0}")]
    State(String),

    #[error("Channel error ({channel}): {reason}")]
    Channel { channel: String, reason: String },

}

impl WardenError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            WardenError::Config(_) => "CONFIG_ERROR",
            WardenError::AuthTimeout { .. } => "AUTH_TIMEOUT",
            WardenError::TokenMissing => "TOKEN_MISSING",
            WardenError::ChainExchange { .. } => "CHAIN_EXCHANGE_FAILURE",
            WardenError::InvokeHandlerFailure { .. } => "INVOKE_HANDLER_FAILURE",
            WardenError::State(_) => "STATE_ERROR",
            WardenError::Channel { .. } => "CHANNEL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
