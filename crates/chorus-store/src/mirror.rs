//! [`MirrorStore`] implementation over the relational database.
//!
//! The engine's mirror workers call in from async context; rusqlite is
//! synchronous, so each operation hops onto the blocking pool with the
//! connection behind a mutex.

use async_trait::async_trait;
use chorus_api::{GroupId, MessageId, UserId};
use chorus_core::error::CoreError;
use chorus_core::mirror::{GroupMessageRow, MirrorStore, PrivateMessageRow};
use std::sync::{Arc, Mutex};

use crate::database::Database;
use crate::models::{kind_as_str, ms_to_datetime, GroupMessageRecord, PrivateMessageRecord};

#[derive(Clone)]
pub struct SqliteMirror {
    db: Arc<Mutex<Database>>,
}

impl SqliteMirror {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.db.clone()
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> crate::error::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| CoreError::MirrorFailed("poisoned database lock".to_string()))?;
            op(&guard).map_err(|e| CoreError::MirrorFailed(e.to_string()))
        })
        .await
        .map_err(|e| CoreError::MirrorFailed(e.to_string()))?
    }
}

#[async_trait]
impl MirrorStore for SqliteMirror {
    async fn insert_private(&self, row: &PrivateMessageRow) -> Result<(), CoreError> {
        let record = PrivateMessageRecord {
            id: row.id.value,
            from_user_id: row.from_user.value.clone(),
            to_user_id: row.to_user.value.clone(),
            content: row.content.clone(),
            msg_type: kind_as_str(row.kind).to_string(),
            created_at: ms_to_datetime(row.created_at_ms),
            is_read: false,
            read_at: None,
        };
        self.blocking(move |db| db.insert_private_message(&record).map(|_| ()))
            .await
    }

    async fn insert_group(&self, row: &GroupMessageRow) -> Result<(), CoreError> {
        let record = GroupMessageRecord {
            id: row.id.value,
            group_id: row.group_id.value.clone(),
            from_user_id: row.from_user.value.clone(),
            content: row.content.clone(),
            msg_type: kind_as_str(row.kind).to_string(),
            created_at: ms_to_datetime(row.created_at_ms),
        };
        self.blocking(move |db| db.insert_group_message(&record).map(|_| ()))
            .await
    }

    async fn mark_private_read(
        &self,
        user: &UserId,
        msg_ids: &[MessageId],
        read_at_ms: u64,
    ) -> Result<(), CoreError> {
        let user = user.value.clone();
        let ids: Vec<uuid::Uuid> = msg_ids.iter().map(|id| id.value).collect();
        let read_at = ms_to_datetime(read_at_ms);
        self.blocking(move |db| db.mark_private_messages_read(&user, &ids, read_at).map(|_| ()))
            .await
    }

    async fn mark_group_read(
        &self,
        group: &GroupId,
        user: &UserId,
        msg_id: &MessageId,
        read_at_ms: u64,
    ) -> Result<(), CoreError> {
        let group = group.value.clone();
        let user = user.value.clone();
        let msg_id = msg_id.value;
        let read_at = ms_to_datetime(read_at_ms);
        self.blocking(move |db| db.upsert_group_read_state(&group, &user, msg_id, read_at))
            .await
    }
}
