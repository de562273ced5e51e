//! Shared configuration, error taxonomy and turn data model for Warden.

pub mod config;
pub mod error;
pub mod redact;
pub mod types;

pub use config::WardenConfig;
pub use error::{Result, WardenError};
pub use redact::Redacted;
pub use types::{ConversationTurn, InvokeRequest, TurnKind};
