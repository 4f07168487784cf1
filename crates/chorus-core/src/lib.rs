pub mod bus;
pub mod config;
pub mod conversations;
pub mod cursor;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod log_store;
pub mod membership;
pub mod mirror;
pub mod policy;
pub mod pull;
pub mod push;
pub mod session;
pub mod time;

#[cfg(test)]
mod tests;

use bus::{run_dispatcher, InMemoryBus, NotificationBus, NotificationStream};
use chorus_api::validation::validate_update_cursor;
use chorus_api::{
    ConversationKey, ConversationSummary, CursorConversationType, GroupId, PullRequest,
    PullResponse, SendGroupRequest, SendPrivateRequest, SendReceipt, StreamId,
    UpdateCursorRequest, UserId,
};
use config::CoreConfig;
use conversations::{ConversationIndex, InMemoryConversationIndex};
use cursor::{CursorStore, InMemoryCursorStore};
use directory::{InMemoryDirectory, ProfileDirectory};
use error::CoreError;
use fanout::{FanoutEngine, RepairEntry};
use log_store::{InMemoryLogStore, LogStore};
use membership::{InMemoryMembership, MembershipCache, MembershipProvider};
use mirror::{MirrorJob, MirrorStore, MirrorWriter};
use policy::Policy;
use pull::PullService;
use push::PushRegistry;
use session::{PushSession, SessionAuthenticator, SessionTransport, StaticAuthenticator};
use std::sync::Arc;
use time::now_ms;
use tokio::task::JoinHandle;

/// External collaborators the engine is wired against. Each has an in-memory
/// implementation beside its trait; deployments swap in their own backends.
pub struct Backends {
    pub log: Arc<dyn LogStore>,
    pub cursor: Arc<dyn CursorStore>,
    pub conversations: Arc<dyn ConversationIndex>,
    pub membership: Arc<dyn MembershipProvider>,
    pub directory: Arc<dyn ProfileDirectory>,
    pub mirror: Arc<dyn MirrorStore>,
    pub bus: Arc<dyn NotificationBus>,
    pub authenticator: Arc<dyn SessionAuthenticator>,
}

impl Backends {
    pub fn in_memory(policy: &Policy) -> Self {
        Self {
            log: Arc::new(InMemoryLogStore::new()),
            cursor: Arc::new(InMemoryCursorStore::new()),
            conversations: Arc::new(InMemoryConversationIndex::new()),
            membership: Arc::new(InMemoryMembership::new()),
            directory: Arc::new(InMemoryDirectory::new()),
            mirror: Arc::new(mirror::InMemoryMirror::new()),
            bus: Arc::new(InMemoryBus::new(policy.bus_capacity)),
            authenticator: Arc::new(StaticAuthenticator::new()),
        }
    }
}

/// The engine facade: owns the fan-out path, the pull path, the push
/// registry, the mirror workers, and the bus dispatcher.
pub struct Core {
    config: CoreConfig,
    policy: Policy,
    cursor: Arc<dyn CursorStore>,
    conversations: Arc<dyn ConversationIndex>,
    membership: Arc<MembershipCache>,
    bus: Arc<dyn NotificationBus>,
    registry: Arc<PushRegistry>,
    authenticator: Arc<dyn SessionAuthenticator>,
    fanout: FanoutEngine,
    pull: PullService,
    mirror: MirrorWriter,
    dispatcher: Option<JoinHandle<()>>,
}

impl Core {
    pub fn init(config: CoreConfig, policy: Policy, backends: Backends) -> Self {
        let membership = Arc::new(MembershipCache::new(backends.membership.clone(), &policy));
        let mirror = MirrorWriter::spawn(backends.mirror.clone(), &policy);
        let fanout = FanoutEngine::new(
            backends.log.clone(),
            backends.conversations.clone(),
            membership.clone(),
            backends.bus.clone(),
            mirror.sender(),
            policy.clone(),
        );
        let pull = PullService::new(
            backends.log.clone(),
            backends.cursor.clone(),
            backends.directory.clone(),
            policy.clone(),
        );
        let registry = PushRegistry::new(policy.session_queue_len);
        let dispatcher = config
            .enable_push_dispatch
            .then(|| run_dispatcher(backends.bus.as_ref(), registry.clone()));
        Self {
            config,
            policy,
            cursor: backends.cursor,
            conversations: backends.conversations,
            membership,
            bus: backends.bus,
            registry,
            authenticator: backends.authenticator,
            fanout,
            pull,
            mirror,
            dispatcher,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub async fn send_private(&self, req: SendPrivateRequest) -> Result<SendReceipt, CoreError> {
        self.fanout.send_private(req).await
    }

    pub async fn send_group(&self, req: SendGroupRequest) -> Result<SendReceipt, CoreError> {
        self.fanout.send_group(req).await
    }

    pub async fn pull(&self, user: &UserId, req: &PullRequest) -> Result<PullResponse, CoreError> {
        self.pull.pull(user, req).await
    }

    /// Client-driven acknowledgment: advances the user cursor monotonically
    /// and, when a read marker accompanies the ack, records the read state
    /// both hot and behind the mirror.
    pub async fn update_cursor(&self, req: UpdateCursorRequest) -> Result<StreamId, CoreError> {
        validate_update_cursor(&req)?;
        let effective = self.cursor.advance(&req.user, req.last_seen_stream_id).await?;
        match req.conversation_type {
            CursorConversationType::Group => {
                let group = GroupId::new(req.peer_id.clone().unwrap_or_default());
                if let Some(last_read) = req.last_read_message_id.as_ref() {
                    self.cursor
                        .set_group_read(&group, &req.user, last_read)
                        .await?;
                    self.fanout.enqueue_mirror(MirrorJob::GroupRead {
                        group,
                        user: req.user.clone(),
                        msg_id: last_read.clone(),
                        read_at_ms: now_ms(),
                    });
                }
            }
            CursorConversationType::Private => {
                if let Some(last_read) = req.last_read_message_id.as_ref() {
                    self.fanout.enqueue_mirror(MirrorJob::PrivateRead {
                        user: req.user.clone(),
                        msg_ids: vec![last_read.clone()],
                        read_at_ms: now_ms(),
                    });
                }
            }
            CursorConversationType::Empty => {}
        }
        Ok(effective)
    }

    pub async fn pin_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationKey,
    ) -> Result<(), CoreError> {
        self.conversations.pin(user, conversation).await
    }

    pub async fn unpin_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationKey,
    ) -> Result<(), CoreError> {
        self.conversations.unpin(user, conversation).await
    }

    pub async fn delete_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationKey,
    ) -> Result<(), CoreError> {
        self.conversations.delete(user, conversation).await
    }

    pub async fn list_conversations(
        &self,
        user: &UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>, CoreError> {
        self.conversations.list(user, offset, limit).await
    }

    /// Accepts an upgraded frame connection and runs the session handshake.
    pub async fn connect_session(
        &self,
        transport: Arc<dyn SessionTransport>,
        token: &str,
    ) -> Result<PushSession, CoreError> {
        session::connect_session(
            self.registry.clone(),
            self.authenticator.clone(),
            transport,
            token,
        )
        .await
    }

    pub async fn is_online(&self, user: &UserId) -> bool {
        self.registry.is_online(user).await
    }

    pub fn registry(&self) -> Arc<PushRegistry> {
        self.registry.clone()
    }

    /// Invalidation hooks for the external membership subsystem. Mutations
    /// must invalidate here before they are announced, or in-flight fan-outs
    /// may target stale member sets.
    pub fn membership(&self) -> Arc<MembershipCache> {
        self.membership.clone()
    }

    pub fn subscribe_notifications(&self) -> NotificationStream {
        self.bus.subscribe()
    }

    pub async fn drain_repairs(&self) -> Vec<RepairEntry> {
        self.fanout.drain_repairs().await
    }

    /// Stops the dispatcher, closes the mirror queue, and waits for in-flight
    /// mirror jobs to settle.
    pub async fn shutdown(self) {
        if let Some(dispatcher) = self.dispatcher {
            dispatcher.abort();
        }
        drop(self.fanout);
        self.mirror.shutdown().await;
    }
}
