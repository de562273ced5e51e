use rusqlite::Connection;

use crate::error::Result;

/// Initialise the bot state table.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bot_state (
            scope       TEXT NOT NULL,
            state_key   TEXT NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (scope, state_key)
        );",
    )?;
    Ok(())
}
