pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::StateError;
pub use sqlite::SqliteStateStore;
pub use store::{MemoryStateStore, StateScope, StateStore};
pub use types::{AuthSession, AuthState, ConversationState, UserState};
