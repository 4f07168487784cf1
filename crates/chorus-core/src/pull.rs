use crate::cursor::CursorStore;
use crate::directory::ProfileDirectory;
use crate::error::CoreError;
use crate::log_store::LogStore;
use crate::policy::Policy;
use chorus_api::validation::validate_pull;
use chorus_api::{
    ConversationBatch, ConversationKey, PeerProfile, PullRequest, PullResponse, PulledMessage,
    StreamId, UserId, ValidationLimits,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Cursor-based incremental read, grouped by conversation.
///
/// The cursor is never advanced here: every returned entry counts as unread
/// until the client acknowledges through the cursor update path. On a crash
/// before the ack the same entries are served again, which is the whole
/// at-least-once contract.
pub struct PullService {
    log: Arc<dyn LogStore>,
    cursor: Arc<dyn CursorStore>,
    directory: Arc<dyn ProfileDirectory>,
    policy: Policy,
}

impl PullService {
    pub fn new(
        log: Arc<dyn LogStore>,
        cursor: Arc<dyn CursorStore>,
        directory: Arc<dyn ProfileDirectory>,
        policy: Policy,
    ) -> Self {
        Self {
            log,
            cursor,
            directory,
            policy,
        }
    }

    pub async fn pull(&self, user: &UserId, req: &PullRequest) -> Result<PullResponse, CoreError> {
        let limits = ValidationLimits {
            max_content_bytes: self.policy.max_content_bytes,
            max_pull_limit: self.policy.max_pull_limit,
        };
        validate_pull(req, &limits)?;
        let per_conversation = req
            .limit_per_conversation
            .unwrap_or(self.policy.default_pull_limit) as usize;

        let start = match req.from_stream_id {
            Some(explicit) => explicit,
            None => match self.cursor.get(user).await {
                Ok(cursor) => cursor,
                // Losing monotonicity here is acceptable: the client re-reads
                // from the beginning and dedupes by message id.
                Err(err) => {
                    warn!("cursor read failed for {}, serving from start: {}", user, err);
                    StreamId::ZERO
                }
            },
        };

        let entries = self
            .log
            .range_after(user, start, self.policy.pull_scan_cap)
            .await?;

        let mut order: Vec<ConversationKey> = Vec::new();
        let mut buckets: HashMap<ConversationKey, ConversationBatch> = HashMap::new();
        for (stream_id, record) in entries {
            let Some(key) = record.conversation_for(user) else {
                debug!("skipping unaddressable log entry {}", record.id);
                continue;
            };
            let batch = buckets.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                ConversationBatch {
                    conversation: key,
                    peer: PeerProfile::default(),
                    messages: Vec::new(),
                    unread_count: 0,
                    last_activity_ms: 0,
                }
            });
            batch.last_activity_ms = batch.last_activity_ms.max(record.created_at_ms);
            // Overflow past the per-conversation cap stays in the log and is
            // re-read on the next pull, since the cursor has not moved.
            if batch.messages.len() >= per_conversation {
                continue;
            }
            batch.messages.push(PulledMessage {
                id: record.id,
                kind: record.kind,
                from_user: record.from_user,
                content: record.content,
                created_at_ms: record.created_at_ms,
                stream_id,
            });
            batch.unread_count += 1;
        }

        let mut conversations: Vec<ConversationBatch> = Vec::with_capacity(order.len());
        for key in order {
            let mut batch = match buckets.remove(&key) {
                Some(batch) => batch,
                None => continue,
            };
            batch.peer = self.enrich(&key).await;
            conversations.push(batch);
        }
        conversations.sort_by(|a, b| b.last_activity_ms.cmp(&a.last_activity_ms));

        let total_unread = conversations.iter().map(|c| c.unread_count).sum();
        Ok(PullResponse {
            conversations,
            total_unread,
        })
    }

    async fn enrich(&self, key: &ConversationKey) -> PeerProfile {
        let looked_up = match key {
            ConversationKey::Private(peer) => self.directory.user_profile(peer).await,
            ConversationKey::Group(group) => self.directory.group_profile(group).await,
        };
        match looked_up {
            Ok(Some(profile)) => profile,
            Ok(None) => PeerProfile::default(),
            Err(err) => {
                debug!("profile enrichment failed for {}: {}", key, err);
                PeerProfile::default()
            }
        }
    }
}
