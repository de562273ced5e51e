use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Result, StateError};
use crate::store::{StateScope, StateStore};

/// SQLite-backed state store.
///
/// Wraps a single connection in a `Mutex`; every call is a short single-row
/// statement so the lock is never held across an await point.
pub struct SqliteStateStore {
    db: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Open (creating if needed) the database at `path` and initialise it.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StateError::Unavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        crate::db::init_db(&conn)?;
        Ok(Self::new(conn))
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn load(&self, scope: StateScope, key: &str) -> Result<Option<Value>> {
        let db = self.conn();
        let raw = match db.query_row(
            "SELECT value FROM bot_state WHERE scope = ?1 AND state_key = ?2",
            rusqlite::params![scope.as_str(), key],
            |row| row.get::<_, String>(0),
        ) {
            Ok(raw) => raw,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(StateError::Database(e)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    #[instrument(skip(self, value), fields(scope = %scope))]
    async fn save(&self, scope: StateScope, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.conn();
        db.execute(
            "INSERT INTO bot_state (scope, state_key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope, state_key)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![scope.as_str(), key, raw, now],
        )?;
        debug!("state saved");
        Ok(())
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn delete(&self, scope: StateScope, key: &str) -> Result<()> {
        let db = self.conn();
        db.execute(
            "DELETE FROM bot_state WHERE scope = ?1 AND state_key = ?2",
            rusqlite::params![scope.as_str(), key],
        )?;
        Ok(())
    }
}
