use crate::error::CoreError;
use crate::policy::Policy;
use crate::time::now_ms;
use async_trait::async_trait;
use chorus_api::{GroupId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Authoritative membership source, owned by the external group subsystem.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn members_of(&self, group: &GroupId) -> Result<Vec<UserId>, CoreError>;
    async fn groups_of(&self, user: &UserId) -> Result<Vec<GroupId>, CoreError>;
}

struct CacheSlot<T> {
    /// `None` is the negative entry: the authority answered "nothing here".
    value: Option<T>,
    expires_at_ms: u64,
}

impl<T: Clone> CacheSlot<T> {
    fn live(&self, now: u64) -> Option<Option<T>> {
        if now < self.expires_at_ms {
            Some(self.value.clone())
        } else {
            None
        }
    }
}

/// Short-TTL cache fronting the membership authority. Empty results are kept
/// as negative entries with a shorter TTL so repeated sends to a nonexistent
/// group do not stampede the authority. The external membership subsystem
/// must call `invalidate_group`/`invalidate_user` on every mutation before
/// announcing it.
pub struct MembershipCache {
    inner: Arc<dyn MembershipProvider>,
    members: Mutex<HashMap<GroupId, CacheSlot<Vec<UserId>>>>,
    groups: Mutex<HashMap<UserId, CacheSlot<Vec<GroupId>>>>,
    member_ttl_ms: u64,
    user_groups_ttl_ms: u64,
    negative_ttl_ms: u64,
}

impl MembershipCache {
    pub fn new(inner: Arc<dyn MembershipProvider>, policy: &Policy) -> Self {
        Self {
            inner,
            members: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            member_ttl_ms: policy.member_cache_ttl_ms,
            user_groups_ttl_ms: policy.user_groups_cache_ttl_ms,
            negative_ttl_ms: policy.negative_cache_ttl_ms,
        }
    }

    pub async fn members_of(&self, group: &GroupId) -> Result<Vec<UserId>, CoreError> {
        let now = now_ms();
        {
            let guard = self.members.lock().await;
            if let Some(slot) = guard.get(group) {
                if let Some(cached) = slot.live(now) {
                    return Ok(cached.unwrap_or_default());
                }
            }
        }
        let loaded = self.inner.members_of(group).await?;
        let slot = if loaded.is_empty() {
            CacheSlot {
                value: None,
                expires_at_ms: now + self.negative_ttl_ms,
            }
        } else {
            CacheSlot {
                value: Some(loaded.clone()),
                expires_at_ms: now + self.member_ttl_ms,
            }
        };
        self.members.lock().await.insert(group.clone(), slot);
        Ok(loaded)
    }

    pub async fn groups_of(&self, user: &UserId) -> Result<Vec<GroupId>, CoreError> {
        let now = now_ms();
        {
            let guard = self.groups.lock().await;
            if let Some(slot) = guard.get(user) {
                if let Some(cached) = slot.live(now) {
                    return Ok(cached.unwrap_or_default());
                }
            }
        }
        let loaded = self.inner.groups_of(user).await?;
        let slot = if loaded.is_empty() {
            CacheSlot {
                value: None,
                expires_at_ms: now + self.negative_ttl_ms,
            }
        } else {
            CacheSlot {
                value: Some(loaded.clone()),
                expires_at_ms: now + self.user_groups_ttl_ms,
            }
        };
        self.groups.lock().await.insert(user.clone(), slot);
        Ok(loaded)
    }

    pub async fn invalidate_group(&self, group: &GroupId) {
        self.members.lock().await.remove(group);
    }

    pub async fn invalidate_user(&self, user: &UserId) {
        self.groups.lock().await.remove(user);
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMembership {
    groups: Arc<Mutex<HashMap<GroupId, Vec<UserId>>>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_members(&self, group: GroupId, members: Vec<UserId>) {
        self.groups.lock().await.insert(group, members);
    }

    pub async fn remove_member(&self, group: &GroupId, user: &UserId) {
        if let Some(members) = self.groups.lock().await.get_mut(group) {
            members.retain(|m| m != user);
        }
    }
}

#[async_trait]
impl MembershipProvider for InMemoryMembership {
    async fn members_of(&self, group: &GroupId) -> Result<Vec<UserId>, CoreError> {
        let guard = self.groups.lock().await;
        Ok(guard.get(group).cloned().unwrap_or_default())
    }

    async fn groups_of(&self, user: &UserId) -> Result<Vec<GroupId>, CoreError> {
        let guard = self.groups.lock().await;
        Ok(guard
            .iter()
            .filter(|(_, members)| members.contains(user))
            .map(|(group, _)| group.clone())
            .collect())
    }
}
