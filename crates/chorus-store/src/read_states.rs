use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::messages::parse_timestamp;
use crate::models::GroupReadState;

impl Database {
    pub fn upsert_group_read_state(
        &self,
        group_id: &str,
        user_id: &str,
        last_read_msg_id: Uuid,
        last_read_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO group_read_states (group_id, user_id, last_read_msg_id, last_read_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(group_id, user_id) DO UPDATE SET
                 last_read_msg_id = excluded.last_read_msg_id,
                 last_read_at = excluded.last_read_at",
            params![
                group_id,
                user_id,
                last_read_msg_id.to_string(),
                last_read_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_group_read_state(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<GroupReadState>> {
        let found = self
            .conn()
            .query_row(
                "SELECT group_id, user_id, last_read_msg_id, last_read_at
                 FROM group_read_states
                 WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
                row_to_read_state,
            )
            .map(Some);
        match found {
            Ok(state) => Ok(state),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }
}

fn row_to_read_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupReadState> {
    let msg_id_str: String = row.get(2)?;
    let read_at_str: String = row.get(3)?;

    let last_read_msg_id = Uuid::parse_str(&msg_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(GroupReadState {
        group_id: row.get(0)?,
        user_id: row.get(1)?,
        last_read_msg_id,
        last_read_at: parse_timestamp(&read_at_str, 3)?,
    })
}
