use log::info;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

const CURRENT_VERSION: u32 = 1;

/// v001 -- message mirror tables: `messages`, `group_messages`, and
/// `group_read_states`. The group table holds one canonical row per message,
/// not one per recipient; per-recipient delivery lives in the hot log.
const V001_UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4, client-visible message id
    from_user_id TEXT NOT NULL,
    to_user_id   TEXT NOT NULL,
    content      TEXT NOT NULL,
    msg_type     TEXT NOT NULL DEFAULT 'text',
    created_at   TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    is_read      INTEGER NOT NULL DEFAULT 0,
    read_at      TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_to_unread
    ON messages(to_user_id, is_read);

CREATE INDEX IF NOT EXISTS idx_messages_pair_created
    ON messages(from_user_id, to_user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS group_messages (
    id           TEXT PRIMARY KEY NOT NULL,
    group_id     TEXT NOT NULL,
    from_user_id TEXT NOT NULL,
    content      TEXT NOT NULL,
    msg_type     TEXT NOT NULL DEFAULT 'text',
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_group_messages_group_created
    ON group_messages(group_id, created_at DESC);

CREATE TABLE IF NOT EXISTS group_read_states (
    group_id         TEXT NOT NULL,
    user_id          TEXT NOT NULL,
    last_read_msg_id TEXT NOT NULL,
    last_read_at     TEXT NOT NULL,

    PRIMARY KEY (group_id, user_id)
);
"#;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    info!(
        "mirror schema at v{}, target v{}",
        current, CURRENT_VERSION
    );

    if current < 1 {
        conn.execute_batch(V001_UP_SQL)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}
