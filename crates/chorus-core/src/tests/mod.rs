pub mod bus_tests;
pub mod cursor_tests;
pub mod membership_tests;
pub mod pull_tests;

use crate::bus::InMemoryBus;
use crate::config::CoreConfig;
use crate::conversations::InMemoryConversationIndex;
use crate::cursor::InMemoryCursorStore;
use crate::directory::InMemoryDirectory;
use crate::log_store::{InMemoryLogStore, StreamRecord};
use crate::membership::InMemoryMembership;
use crate::mirror::InMemoryMirror;
use crate::policy::Policy;
use crate::session::StaticAuthenticator;
use crate::{Backends, Core};
use chorus_api::{GroupId, MessageId, MessageKind, SendGroupRequest, SendPrivateRequest, UserId};
use std::sync::Arc;

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub fn group(id: &str) -> GroupId {
    GroupId::new(id)
}

pub fn private_req(from: &str, to: &str, content: &str) -> SendPrivateRequest {
    SendPrivateRequest {
        client_message_id: None,
        from_user: user(from),
        to_user: user(to),
        content: content.to_string(),
        kind: MessageKind::Text,
    }
}

pub fn group_req(from: &str, group_id: &str, content: &str) -> SendGroupRequest {
    SendGroupRequest {
        client_message_id: None,
        from_user: user(from),
        group_id: group(group_id),
        content: content.to_string(),
        kind: MessageKind::Text,
    }
}

pub fn private_record(from: &str, to: &str, content: &str, created_at_ms: u64) -> StreamRecord {
    StreamRecord {
        id: MessageId::random(),
        kind: MessageKind::Text,
        from_user: user(from),
        to_user: Some(user(to)),
        group_id: None,
        content: content.to_string(),
        created_at_ms,
    }
}

pub fn group_record(from: &str, group_id: &str, content: &str, created_at_ms: u64) -> StreamRecord {
    StreamRecord {
        id: MessageId::random(),
        kind: MessageKind::Text,
        from_user: user(from),
        to_user: None,
        group_id: Some(group(group_id)),
        content: content.to_string(),
        created_at_ms,
    }
}

/// Short backoffs so retry paths settle within test time.
pub fn fast_policy() -> Policy {
    Policy {
        mirror_backoff_initial_ms: 5,
        mirror_backoff_max_ms: 20,
        ..Policy::default()
    }
}

/// One engine with every collaborator held concretely so tests can seed and
/// inspect them.
pub struct Harness {
    pub core: Core,
    pub log: InMemoryLogStore,
    pub cursors: InMemoryCursorStore,
    pub conversations: InMemoryConversationIndex,
    pub membership: InMemoryMembership,
    pub directory: InMemoryDirectory,
    pub mirror: InMemoryMirror,
    pub bus: InMemoryBus,
    pub authenticator: StaticAuthenticator,
}

pub fn harness() -> Harness {
    harness_with(fast_policy())
}

pub fn harness_with(policy: Policy) -> Harness {
    let log = InMemoryLogStore::new();
    let cursors = InMemoryCursorStore::new();
    let conversations = InMemoryConversationIndex::new();
    let membership = InMemoryMembership::new();
    let directory = InMemoryDirectory::new();
    let mirror = InMemoryMirror::new();
    let bus = InMemoryBus::new(policy.bus_capacity);
    let authenticator = StaticAuthenticator::new();
    let backends = Backends {
        log: Arc::new(log.clone()),
        cursor: Arc::new(cursors.clone()),
        conversations: Arc::new(conversations.clone()),
        membership: Arc::new(membership.clone()),
        directory: Arc::new(directory.clone()),
        mirror: Arc::new(mirror.clone()),
        bus: Arc::new(bus.clone()),
        authenticator: Arc::new(authenticator.clone()),
    };
    let core = Core::init(CoreConfig::default(), policy, backends);
    Harness {
        core,
        log,
        cursors,
        conversations,
        membership,
        directory,
        mirror,
        bus,
        authenticator,
    }
}
