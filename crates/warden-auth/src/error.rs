use thiserror::Error;
use warden_core::WardenError;

use crate::token::Hop;

/// Failure of a single hop of the token chain.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The presented token was rejected (invalid or expired).
    #[error("{hop} hop rejected the presented token (HTTP {status})")]
    Unauthorized { hop: Hop, status: u16 },

    /// The token issuer refused the grant; a fresh upstream token is needed.
    #[error("{hop} hop grant rejected: {code}: {description}")]
    InvalidGrant {
        hop: Hop,
        code: String,
        description: String,
    },

    /// Network failure, timeout, throttling or 5xx.
    #[error("{hop} hop service error (status {status:?}): {message}")]
    Service {
        hop: Hop,
        status: Option<u16>,
        message: String,
    },

    /// A 4xx the chain cannot act on (bad client configuration, malformed request).
    #[error("{hop} hop request rejected (HTTP {status}): {message}")]
    Rejected {
        hop: Hop,
        status: u16,
        message: String,
    },

    /// The issuer answered 2xx with a body that is not a usable token.
    #[error("{hop} hop returned an unusable response: {message}")]
    InvalidResponse { hop: Hop, message: String },
}

impl ExchangeError {
    pub fn hop(&self) -> Hop {
        match self {
            ExchangeError::Unauthorized { hop, .. }
            | ExchangeError::InvalidGrant { hop, .. }
            | ExchangeError::Service { hop, .. }
            | ExchangeError::Rejected { hop, .. }
            | ExchangeError::InvalidResponse { hop, .. } => *hop,
        }
    }

    /// Recoverable errors are resolved by prompting the user again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Unauthorized { .. } | ExchangeError::InvalidGrant { .. }
        )
    }

    /// Only transient service failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Service { .. })
    }

    /// HTTP status to relay to a caller. Transport failures and unusable
    /// bodies count as a bad gateway; a refused grant is the issuer's 400.
    pub fn upstream_status(&self) -> u16 {
        match self {
            ExchangeError::Unauthorized { status, .. } | ExchangeError::Rejected { status, .. } => *status,
            ExchangeError::InvalidGrant { .. } => 400,
            ExchangeError::Service { status, .. } => status.unwrap_or(502),
            ExchangeError::InvalidResponse { .. } => 502,
        }
    }

    pub(crate) fn from_http(hop: Hop, err: reqwest::Error) -> Self {
        ExchangeError::Service {
            hop,
            status: err.status().map(|s| s.as_u16()),
            message: if err.is_timeout() {
                "request timed out".to_string()
            } else {
                err.to_string()
            },
        }
    }
}

impl From<ExchangeError> for WardenError {
    fn from(err: ExchangeError) -> Self {
        WardenError::ChainExchange {
            hop: err.hop().to_string(),
            recoverable: err.is_recoverable(),
            reason: err.to_string(),
        }
    }
}

/// Errors from the user-token service and the PKCE helpers.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },

    #[error("unparseable token service response: {0}")]
    Parse(String),

    #[error("secure random generator failed")]
    Random,
}
