use thiserror::Error;

use crate::types::AuthState;

/// Errors that can occur while loading, saving or mutating bot state.
#[derive(Debug, Error)]
pub enum StateError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored state bag could not be encoded or decoded.
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The dialog engine asked for a move the state table does not allow.
    #[error("illegal authentication transition: {from:?} -> {to:?}")]
    IllegalTransition { from: AuthState, to: AuthState },

    /// A prompt timeout too large to turn into a deadline.
    #[error("prompt timeout of {timeout_ms}ms cannot be represented")]
    InvalidDeadline { timeout_ms: u64 },

    /// The backing store is temporarily unreachable.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StateError>;
