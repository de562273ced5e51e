use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::token::{Hop, TokenChainLink};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: String,
    connection: String,
    hop: Hop,
}

/// Issued tokens keyed by (user, connection, hop).
///
/// Concurrent readers, single writer per key; a later `put` for the same key
/// replaces the earlier one. An entry past its expiry is a miss and is
/// removed on lookup.
#[derive(Default)]
pub struct TokenCache {
    links: DashMap<CacheKey, TokenChainLink>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str, connection: &str, hop: Hop, now: DateTime<Utc>) -> Option<TokenChainLink> {
        let key = CacheKey {
            user_id: user_id.to_string(),
            connection: connection.to_string(),
            hop,
        };
        if let Some(link) = self.links.get(&key) {
            if link.is_valid_at(now) {
                return Some(link.clone());
            }
        }
        if self
            .links
            .remove_if(&key, |_, link| !link.is_valid_at(now))
            .is_some()
        {
            debug!(user_id, %hop, "cached token expired");
        }
        None
    }

    pub fn put(&self, user_id: &str, connection: &str, link: TokenChainLink) {
        let key = CacheKey {
            user_id: user_id.to_string(),
            connection: connection.to_string(),
            hop: link.kind,
        };
        self.links.insert(key, link);
    }

    pub fn evict(&self, user_id: &str, connection: &str, hop: Hop) {
        self.links.remove(&CacheKey {
            user_id: user_id.to_string(),
            connection: connection.to_string(),
            hop,
        });
    }

    /// Drop every hop cached for the user on this connection.
    pub fn evict_user(&self, user_id: &str, connection: &str) {
        self.links
            .retain(|key, _| !(key.user_id == user_id && key.connection == connection));
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
