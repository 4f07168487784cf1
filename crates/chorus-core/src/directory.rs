use crate::error::CoreError;
use async_trait::async_trait;
use chorus_api::{GroupId, PeerProfile, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Display metadata for conversation enrichment, owned by the external user
/// and group services. Lookups are best-effort: a miss or an error never
/// fails the calling pull.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn user_profile(&self, user: &UserId) -> Result<Option<PeerProfile>, CoreError>;
    async fn group_profile(&self, group: &GroupId) -> Result<Option<PeerProfile>, CoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    users: Arc<Mutex<HashMap<UserId, PeerProfile>>>,
    groups: Arc<Mutex<HashMap<GroupId, PeerProfile>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_user(&self, user: UserId, profile: PeerProfile) {
        self.users.lock().await.insert(user, profile);
    }

    pub async fn put_group(&self, group: GroupId, profile: PeerProfile) {
        self.groups.lock().await.insert(group, profile);
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryDirectory {
    async fn user_profile(&self, user: &UserId) -> Result<Option<PeerProfile>, CoreError> {
        Ok(self.users.lock().await.get(user).cloned())
    }

    async fn group_profile(&self, group: &GroupId) -> Result<Option<PeerProfile>, CoreError> {
        Ok(self.groups.lock().await.get(group).cloned())
    }
}
