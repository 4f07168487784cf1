use crate::error::CoreError;
use crate::time::now_ms;
use async_trait::async_trait;
use chorus_api::{ConversationKey, GroupId, MessageId, MessageKind, StreamId, UserId};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Entry stored verbatim in a user log. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRecord {
    pub id: MessageId,
    pub kind: MessageKind,
    pub from_user: UserId,
    pub to_user: Option<UserId>,
    pub group_id: Option<GroupId>,
    pub content: String,
    pub created_at_ms: u64,
}

impl StreamRecord {
    /// Conversation this entry belongs to from the log owner's point of view.
    pub fn conversation_for(&self, owner: &UserId) -> Option<ConversationKey> {
        if let Some(group) = self.group_id.as_ref() {
            return Some(ConversationKey::Group(group.clone()));
        }
        let peer = if &self.from_user == owner {
            self.to_user.clone()?
        } else {
            self.from_user.clone()
        };
        Some(ConversationKey::Private(peer))
    }
}

/// Authoritative ordered message log, one stream per user.
///
/// Stream ids are assigned on append and are strictly increasing within one
/// log; they are the only ordering key. Appends are idempotent per message id:
/// a retry with an id already present in the log returns the stream id
/// assigned the first time.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, user: &UserId, record: StreamRecord) -> Result<StreamId, CoreError>;

    /// Up to `max` entries with stream id strictly greater than `cursor`, in
    /// increasing order. Empty when caught up; never skips entries.
    async fn range_after(
        &self,
        user: &UserId,
        cursor: StreamId,
        max: usize,
    ) -> Result<Vec<(StreamId, StreamRecord)>, CoreError>;

    /// Last `n` entries in decreasing stream-id order.
    async fn tail(&self, user: &UserId, n: usize)
        -> Result<Vec<(StreamId, StreamRecord)>, CoreError>;

    /// Retain at most `keep` most-recent entries.
    async fn trim(&self, user: &UserId, keep: usize) -> Result<(), CoreError>;

    async fn len(&self, user: &UserId) -> Result<usize, CoreError>;
}

struct UserLog {
    entries: BTreeMap<StreamId, StreamRecord>,
    by_msg: HashMap<Uuid, StreamId>,
    last: StreamId,
}

impl Default for UserLog {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            by_msg: HashMap::new(),
            last: StreamId::ZERO,
        }
    }
}

impl UserLog {
    fn next_id(&self) -> StreamId {
        let now = now_ms();
        if now > self.last.ms {
            StreamId::new(now, 0)
        } else {
            StreamId::new(self.last.ms, self.last.seq + 1)
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLogStore {
    logs: Arc<Mutex<HashMap<UserId, UserLog>>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn append(&self, user: &UserId, record: StreamRecord) -> Result<StreamId, CoreError> {
        let mut guard = self.logs.lock().await;
        let log = guard.entry(user.clone()).or_default();
        if let Some(existing) = log.by_msg.get(&record.id.value) {
            return Ok(*existing);
        }
        let id = log.next_id();
        log.by_msg.insert(record.id.value, id);
        log.entries.insert(id, record);
        log.last = id;
        Ok(id)
    }

    async fn range_after(
        &self,
        user: &UserId,
        cursor: StreamId,
        max: usize,
    ) -> Result<Vec<(StreamId, StreamRecord)>, CoreError> {
        let guard = self.logs.lock().await;
        let Some(log) = guard.get(user) else {
            return Ok(Vec::new());
        };
        let out = log
            .entries
            .range((Bound::Excluded(cursor), Bound::Unbounded))
            .take(max)
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        Ok(out)
    }

    async fn tail(
        &self,
        user: &UserId,
        n: usize,
    ) -> Result<Vec<(StreamId, StreamRecord)>, CoreError> {
        let guard = self.logs.lock().await;
        let Some(log) = guard.get(user) else {
            return Ok(Vec::new());
        };
        let out = log
            .entries
            .iter()
            .rev()
            .take(n)
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        Ok(out)
    }

    async fn trim(&self, user: &UserId, keep: usize) -> Result<(), CoreError> {
        let mut guard = self.logs.lock().await;
        let Some(log) = guard.get_mut(user) else {
            return Ok(());
        };
        while log.entries.len() > keep {
            let Some((&oldest, _)) = log.entries.iter().next() else {
                break;
            };
            if let Some(removed) = log.entries.remove(&oldest) {
                log.by_msg.remove(&removed.id.value);
            }
        }
        Ok(())
    }

    async fn len(&self, user: &UserId) -> Result<usize, CoreError> {
        let guard = self.logs.lock().await;
        Ok(guard.get(user).map(|log| log.entries.len()).unwrap_or(0))
    }
}
