use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::PrivateMessageRecord;

impl Database {
    /// Idempotent on the message id: a retried insert is a no-op and reports
    /// whether a new row landed.
    pub fn insert_private_message(&self, record: &PrivateMessageRecord) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO messages
                 (id, from_user_id, to_user_id, content, msg_type, created_at, is_read, read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.from_user_id,
                record.to_user_id,
                record.content,
                record.msg_type,
                record.created_at.to_rfc3339(),
                record.is_read,
                record.read_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_private_message(&self, id: Uuid) -> Result<PrivateMessageRecord> {
        self.conn()
            .query_row(
                "SELECT id, from_user_id, to_user_id, content, msg_type, created_at, is_read, read_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_private_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Marks the given messages read, but only those addressed to `user`.
    /// Returns how many rows changed.
    pub fn mark_private_messages_read(
        &self,
        user: &str,
        ids: &[Uuid],
        read_at: DateTime<Utc>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let query = format!(
            "UPDATE messages SET is_read = 1, read_at = ?
             WHERE to_user_id = ? AND id IN ({})",
            placeholders
        );
        let mut args: Vec<String> = vec![read_at.to_rfc3339(), user.to_string()];
        args.extend(ids.iter().map(|id| id.to_string()));
        let affected = self
            .conn()
            .execute(&query, params_from_iter(args.iter()))?;
        Ok(affected)
    }

    pub fn unread_private_count(&self, user: &str) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE to_user_id = ?1 AND is_read = 0",
            params![user],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Unread messages addressed to `user`, most recent first.
    pub fn unread_private(&self, user: &str, limit: u32) -> Result<Vec<PrivateMessageRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, from_user_id, to_user_id, content, msg_type, created_at, is_read, read_at
             FROM messages
             WHERE to_user_id = ?1 AND is_read = 0
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user, limit], row_to_private_message)?;
        collect_rows(rows)
    }

    /// Deep history of one private conversation, for reads past the hot log's
    /// retention window. Most recent first.
    pub fn private_history(
        &self,
        user: &str,
        peer: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PrivateMessageRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, from_user_id, to_user_id, content, msg_type, created_at, is_read, read_at
             FROM messages
             WHERE (from_user_id = ?1 AND to_user_id = ?2)
                OR (from_user_id = ?2 AND to_user_id = ?1)
             ORDER BY created_at DESC
             LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(params![user, peer, limit, offset], row_to_private_message)?;
        collect_rows(rows)
    }
}

pub(crate) fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn row_to_private_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrivateMessageRecord> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(5)?;
    let read_at_str: Option<String> = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at = parse_timestamp(&created_str, 5)?;
    let read_at = match read_at_str {
        Some(raw) => Some(parse_timestamp(&raw, 7)?),
        None => None,
    };

    Ok(PrivateMessageRecord {
        id,
        from_user_id: row.get(1)?,
        to_user_id: row.get(2)?,
        content: row.get(3)?,
        msg_type: row.get(4)?,
        created_at,
        is_read: row.get(6)?,
        read_at,
    })
}

pub(crate) fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
