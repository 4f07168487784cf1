use crate::bus::NotificationBus;
use crate::conversations::ConversationIndex;
use crate::error::CoreError;
use crate::log_store::{LogStore, StreamRecord};
use crate::membership::MembershipCache;
use crate::mirror::{GroupMessageRow, MirrorJob, PrivateMessageRow};
use crate::policy::Policy;
use crate::time::now_ms;
use chorus_api::validation::{validate_send_group, validate_send_private};
use chorus_api::{
    ConversationKey, GroupId, MessageId, Notification, SendGroupRequest, SendPrivateRequest,
    SendReceipt, UserId, ValidationLimits,
};
use log::warn;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A per-member append that failed during a group fan-out, kept for a later
/// repair pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepairEntry {
    pub group_id: GroupId,
    pub message_id: MessageId,
    pub member: UserId,
}

/// The send path: persists to the per-recipient logs, bumps conversation
/// indexes, announces on the bus, and hands the durable row to the mirror.
pub struct FanoutEngine {
    log: Arc<dyn LogStore>,
    conversations: Arc<dyn ConversationIndex>,
    membership: Arc<MembershipCache>,
    bus: Arc<dyn NotificationBus>,
    mirror_tx: mpsc::Sender<MirrorJob>,
    policy: Policy,
    repairs: Mutex<Vec<RepairEntry>>,
}

impl FanoutEngine {
    pub fn new(
        log: Arc<dyn LogStore>,
        conversations: Arc<dyn ConversationIndex>,
        membership: Arc<MembershipCache>,
        bus: Arc<dyn NotificationBus>,
        mirror_tx: mpsc::Sender<MirrorJob>,
        policy: Policy,
    ) -> Self {
        Self {
            log,
            conversations,
            membership,
            bus,
            mirror_tx,
            policy,
            repairs: Mutex::new(Vec::new()),
        }
    }

    fn limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_content_bytes: self.policy.max_content_bytes,
            max_pull_limit: self.policy.max_pull_limit,
        }
    }

    pub async fn send_private(&self, req: SendPrivateRequest) -> Result<SendReceipt, CoreError> {
        validate_send_private(&req, &self.limits())?;
        let message_id = req.client_message_id.clone().unwrap_or_else(MessageId::random);
        let created_at_ms = now_ms();
        let record = StreamRecord {
            id: message_id.clone(),
            kind: req.kind,
            from_user: req.from_user.clone(),
            to_user: Some(req.to_user.clone()),
            group_id: None,
            content: req.content.clone(),
            created_at_ms,
        };

        // Recipient log first. If the sender-side echo append fails after
        // this point, the recipient never observes a half-delivered state and
        // the sender's client resurfaces the message from its own sent queue.
        let stream_id = self.log.append(&req.to_user, record.clone()).await?;
        if let Err(err) = self.log.append(&req.from_user, record).await {
            warn!(
                "sender echo append failed for {} -> {}: {}",
                req.from_user, req.to_user, err
            );
        }
        self.trim_quietly(&req.to_user).await;
        self.trim_quietly(&req.from_user).await;

        let bumped_at = now_ms();
        self.bump_quietly(&req.from_user, &ConversationKey::Private(req.to_user.clone()), bumped_at)
            .await;
        self.bump_quietly(&req.to_user, &ConversationKey::Private(req.from_user.clone()), bumped_at)
            .await;

        let notification = Notification::Private {
            msg_id: message_id.clone(),
            to_user_id: req.to_user.clone(),
            from_user_id: req.from_user.clone(),
            content: req.content.clone(),
            created_at: created_at_ms,
        };
        if let Err(err) = self.bus.publish(&notification).await {
            warn!("notification publish failed for {}: {}", message_id, err);
        }

        self.enqueue_mirror(MirrorJob::Private(PrivateMessageRow {
            id: message_id.clone(),
            from_user: req.from_user,
            to_user: req.to_user,
            content: req.content,
            kind: req.kind,
            created_at_ms,
        }));

        Ok(SendReceipt {
            message_id,
            created_at_ms,
            stream_id: Some(stream_id),
        })
    }

    pub async fn send_group(&self, req: SendGroupRequest) -> Result<SendReceipt, CoreError> {
        validate_send_group(&req, &self.limits())?;
        let members = self.membership.members_of(&req.group_id).await?;
        if members.is_empty() {
            return Err(CoreError::GroupEmpty);
        }
        if !members.contains(&req.from_user) {
            return Err(CoreError::NotAMember);
        }

        let message_id = req.client_message_id.clone().unwrap_or_else(MessageId::random);
        let created_at_ms = now_ms();
        let record = StreamRecord {
            id: message_id.clone(),
            kind: req.kind,
            from_user: req.from_user.clone(),
            to_user: None,
            group_id: Some(req.group_id.clone()),
            content: req.content.clone(),
            created_at_ms,
        };
        let conversation = ConversationKey::Group(req.group_id.clone());

        // The sender is a member too: their own devices see the message via
        // their log. Per-member failures are repair work, not send failures,
        // as long as at least one append lands.
        let mut appended = 0usize;
        for member in &members {
            match self.log.append(member, record.clone()).await {
                Ok(_) => {
                    appended += 1;
                    self.trim_quietly(member).await;
                    self.bump_quietly(member, &conversation, created_at_ms).await;
                    if member != &req.from_user {
                        let notification = Notification::Group {
                            msg_id: message_id.clone(),
                            to_user_id: member.clone(),
                            from_user_id: req.from_user.clone(),
                            group_id: req.group_id.clone(),
                            content: req.content.clone(),
                            created_at: created_at_ms,
                        };
                        if let Err(err) = self.bus.publish(&notification).await {
                            warn!(
                                "group notification publish failed for {} to {}: {}",
                                message_id, member, err
                            );
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "group append failed for member {} of {}: {}",
                        member, req.group_id, err
                    );
                    self.repairs.lock().await.push(RepairEntry {
                        group_id: req.group_id.clone(),
                        message_id: message_id.clone(),
                        member: member.clone(),
                    });
                }
            }
        }
        if appended == 0 {
            return Err(CoreError::FanoutFailed);
        }

        // One canonical row keyed by message id, not one per recipient.
        self.enqueue_mirror(MirrorJob::Group(GroupMessageRow {
            id: message_id.clone(),
            group_id: req.group_id,
            from_user: req.from_user,
            content: req.content,
            kind: req.kind,
            created_at_ms,
        }));

        Ok(SendReceipt {
            message_id,
            created_at_ms,
            stream_id: None,
        })
    }

    pub fn enqueue_mirror(&self, job: MirrorJob) {
        if let Err(err) = self.mirror_tx.try_send(job) {
            warn!("mirror queue rejected job: {}", err);
        }
    }

    /// Hands out the accumulated per-member append failures and clears them.
    pub async fn drain_repairs(&self) -> Vec<RepairEntry> {
        std::mem::take(&mut *self.repairs.lock().await)
    }

    async fn bump_quietly(&self, user: &UserId, conversation: &ConversationKey, at_ms: u64) {
        if let Err(err) = self.conversations.bump(user, conversation, at_ms).await {
            warn!("conversation bump failed for {}: {}", user, err);
        }
    }

    async fn trim_quietly(&self, user: &UserId) {
        if let Err(err) = self.log.trim(user, self.policy.log_retention).await {
            warn!("log trim failed for {}: {}", user, err);
        }
    }
}
