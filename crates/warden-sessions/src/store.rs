use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::types::{ConversationState, UserState};

/// Which state bag a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateScope {
    Conversation,
    User,
}

impl StateScope {
    pub fn as_str(self) -> &'static str {
        match self {
            StateScope::Conversation => "conversation",
            StateScope::User => "user",
        }
    }
}

impl fmt::Display for StateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistence seam for conversation- and user-scoped state.
///
/// Implementations store opaque JSON documents; the typed helpers decode
/// them into [`ConversationState`] / [`UserState`]. A missing record loads
/// as the default value.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, scope: StateScope, key: &str) -> Result<Option<Value>>;

    async fn save(&self, scope: StateScope, key: &str, value: &Value) -> Result<()>;

    async fn delete(&self, scope: StateScope, key: &str) -> Result<()>;

    async fn load_conversation(&self, conversation_id: &str) -> Result<ConversationState> {
        match self.load(StateScope::Conversation, conversation_id).await? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(ConversationState::default()),
        }
    }

    async fn save_conversation(&self, conversation_id: &str, state: &ConversationState) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.save(StateScope::Conversation, conversation_id, &value).await
    }

    async fn load_user(&self, user_id: &str) -> Result<UserState> {
        match self.load(StateScope::User, user_id).await? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(UserState::default()),
        }
    }

    async fn save_user(&self, user_id: &str, state: &UserState) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.save(StateScope::User, user_id, &value).await
    }
}

/// Process-local store. State is lost on restart.
#[derive(Default)]
pub struct MemoryStateStore {
    records: DashMap<(StateScope, String), Value>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, scope: StateScope, key: &str) -> Result<Option<Value>> {
        Ok(self
            .records
            .get(&(scope, key.to_string()))
            .map(|v| v.value().clone()))
    }

    async fn save(&self, scope: StateScope, key: &str, value: &Value) -> Result<()> {
        debug!(%scope, key, "state saved (memory)");
        self.records.insert((scope, key.to_string()), value.clone());
        Ok(())
    }

    async fn delete(&self, scope: StateScope, key: &str) -> Result<()> {
        self.records.remove(&(scope, key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthState;

    #[tokio::test]
    async fn missing_records_load_as_default() {
        let store = MemoryStateStore::new();
        let conv = store.load_conversation("c1").await.unwrap();
        assert!(conv.sessions.is_empty());
        let user = store.load_user("u1").await.unwrap();
        assert_eq!(user.signin_count, 0);
    }

    #[tokio::test]
    async fn scopes_do_not_collide() {
        let store = MemoryStateStore::new();
        let mut conv = ConversationState::default();
        conv.session_mut("same").transition(AuthState::Prompting).unwrap();
        store.save_conversation("same", &conv).await.unwrap();
        store
            .save_user("same", &UserState { signin_count: 2, ..Default::default() })
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        let loaded = store.load_conversation("same").await.unwrap();
        assert_eq!(loaded.session("same").unwrap().state, AuthState::Prompting);
        assert_eq!(store.load_user("same").await.unwrap().signin_count, 2);

        store.delete(StateScope::User, "same").await.unwrap();
        assert_eq!(store.load_user("same").await.unwrap().signin_count, 0);
    }
}
