use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::{collect_rows, parse_timestamp};
use crate::models::GroupMessageRecord;

impl Database {
    /// One canonical row per group message. Idempotent on the message id.
    pub fn insert_group_message(&self, record: &GroupMessageRecord) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO group_messages
                 (id, group_id, from_user_id, content, msg_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.to_string(),
                record.group_id,
                record.from_user_id,
                record.content,
                record.msg_type,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_group_message(&self, id: Uuid) -> Result<GroupMessageRecord> {
        self.conn()
            .query_row(
                "SELECT id, group_id, from_user_id, content, msg_type, created_at
                 FROM group_messages WHERE id = ?1",
                params![id.to_string()],
                row_to_group_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Deep history of one group, most recent first.
    pub fn group_history(
        &self,
        group_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<GroupMessageRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, group_id, from_user_id, content, msg_type, created_at
             FROM group_messages
             WHERE group_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![group_id, limit, offset], row_to_group_message)?;
        collect_rows(rows)
    }
}

fn row_to_group_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupMessageRecord> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(GroupMessageRecord {
        id,
        group_id: row.get(1)?,
        from_user_id: row.get(2)?,
        content: row.get(3)?,
        msg_type: row.get(4)?,
        created_at: parse_timestamp(&created_str, 5)?,
    })
}
