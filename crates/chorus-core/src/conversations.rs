use crate::error::CoreError;
use async_trait::async_trait;
use chorus_api::{ConversationKey, ConversationSummary, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Additive score offset that lifts pinned conversations above all unpinned
/// ones. Strictly greater than any plausible millisecond timestamp.
pub const PIN_BIAS: u64 = 10_u64.pow(13);

/// Ranked set of conversations per user. Score is `last_activity_ms`, plus
/// `PIN_BIAS` while pinned, so `list` yields pinned entries first and
/// most-recent-within-each-tier second.
#[async_trait]
pub trait ConversationIndex: Send + Sync {
    /// Refreshes last activity, preserving the pin flag.
    async fn bump(
        &self,
        user: &UserId,
        conversation: &ConversationKey,
        now_ms: u64,
    ) -> Result<(), CoreError>;

    async fn pin(&self, user: &UserId, conversation: &ConversationKey) -> Result<(), CoreError>;

    async fn unpin(&self, user: &UserId, conversation: &ConversationKey) -> Result<(), CoreError>;

    /// Descending by score.
    async fn list(
        &self,
        user: &UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>, CoreError>;

    async fn delete(&self, user: &UserId, conversation: &ConversationKey)
        -> Result<(), CoreError>;

    async fn score(
        &self,
        user: &UserId,
        conversation: &ConversationKey,
    ) -> Result<Option<u64>, CoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryConversationIndex {
    scores: Arc<Mutex<HashMap<UserId, HashMap<ConversationKey, u64>>>>,
}

impl InMemoryConversationIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationIndex for InMemoryConversationIndex {
    async fn bump(
        &self,
        user: &UserId,
        conversation: &ConversationKey,
        now_ms: u64,
    ) -> Result<(), CoreError> {
        let mut guard = self.scores.lock().await;
        let entries = guard.entry(user.clone()).or_default();
        let slot = entries.entry(conversation.clone()).or_insert(0);
        *slot = if *slot >= PIN_BIAS {
            PIN_BIAS + now_ms
        } else {
            now_ms
        };
        Ok(())
    }

    async fn pin(&self, user: &UserId, conversation: &ConversationKey) -> Result<(), CoreError> {
        let mut guard = self.scores.lock().await;
        let entries = guard.entry(user.clone()).or_default();
        let slot = entries.entry(conversation.clone()).or_insert(0);
        if *slot < PIN_BIAS {
            *slot += PIN_BIAS;
        }
        Ok(())
    }

    async fn unpin(&self, user: &UserId, conversation: &ConversationKey) -> Result<(), CoreError> {
        let mut guard = self.scores.lock().await;
        if let Some(entries) = guard.get_mut(user) {
            if let Some(slot) = entries.get_mut(conversation) {
                if *slot >= PIN_BIAS {
                    *slot -= PIN_BIAS;
                }
            }
        }
        Ok(())
    }

    async fn list(
        &self,
        user: &UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>, CoreError> {
        let guard = self.scores.lock().await;
        let Some(entries) = guard.get(user) else {
            return Ok(Vec::new());
        };
        let mut ranked: Vec<(&ConversationKey, u64)> =
            entries.iter().map(|(key, score)| (key, *score)).collect();
        // Key order breaks score ties so pagination stays stable.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));
        let out = ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(key, score)| {
                let is_pinned = score >= PIN_BIAS;
                ConversationSummary {
                    conversation: key.clone(),
                    is_pinned,
                    last_activity_ms: if is_pinned { score - PIN_BIAS } else { score },
                }
            })
            .collect();
        Ok(out)
    }

    async fn delete(
        &self,
        user: &UserId,
        conversation: &ConversationKey,
    ) -> Result<(), CoreError> {
        let mut guard = self.scores.lock().await;
        if let Some(entries) = guard.get_mut(user) {
            entries.remove(conversation);
        }
        Ok(())
    }

    async fn score(
        &self,
        user: &UserId,
        conversation: &ConversationKey,
    ) -> Result<Option<u64>, CoreError> {
        let guard = self.scores.lock().await;
        Ok(guard
            .get(user)
            .and_then(|entries| entries.get(conversation))
            .copied())
    }
}
