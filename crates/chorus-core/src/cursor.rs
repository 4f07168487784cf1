use crate::error::CoreError;
use async_trait::async_trait;
use chorus_api::{GroupId, MessageId, StreamId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-user read boundary into that user's log, plus per-(group, user) read
/// markers used for group history reconciliation.
///
/// The user cursor is monotonically non-decreasing; monotonicity is enforced
/// by the store, not the caller. `get` failures are degraded to the beginning
/// sentinel by callers (the client re-reads and dedupes by message id);
/// `advance` failures surface.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, user: &UserId) -> Result<StreamId, CoreError>;

    /// Sets the cursor to `max(current, cursor)` and returns the effective
    /// value.
    async fn advance(&self, user: &UserId, cursor: StreamId) -> Result<StreamId, CoreError>;

    async fn set_group_read(
        &self,
        group: &GroupId,
        user: &UserId,
        last_read: &MessageId,
    ) -> Result<(), CoreError>;

    async fn group_read(
        &self,
        group: &GroupId,
        user: &UserId,
    ) -> Result<Option<MessageId>, CoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryCursorStore {
    cursors: Arc<Mutex<HashMap<UserId, StreamId>>>,
    group_reads: Arc<Mutex<HashMap<(GroupId, UserId), MessageId>>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn get(&self, user: &UserId) -> Result<StreamId, CoreError> {
        let guard = self.cursors.lock().await;
        Ok(guard.get(user).copied().unwrap_or(StreamId::ZERO))
    }

    async fn advance(&self, user: &UserId, cursor: StreamId) -> Result<StreamId, CoreError> {
        let mut guard = self.cursors.lock().await;
        let slot = guard.entry(user.clone()).or_insert(StreamId::ZERO);
        if cursor > *slot {
            *slot = cursor;
        }
        Ok(*slot)
    }

    async fn set_group_read(
        &self,
        group: &GroupId,
        user: &UserId,
        last_read: &MessageId,
    ) -> Result<(), CoreError> {
        let mut guard = self.group_reads.lock().await;
        guard.insert((group.clone(), user.clone()), last_read.clone());
        Ok(())
    }

    async fn group_read(
        &self,
        group: &GroupId,
        user: &UserId,
    ) -> Result<Option<MessageId>, CoreError> {
        let guard = self.group_reads.lock().await;
        Ok(guard.get(&(group.clone(), user.clone())).cloned())
    }
}
