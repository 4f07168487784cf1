use super::{fast_policy, group, user};
use crate::error::CoreError;
use crate::membership::{InMemoryMembership, MembershipCache, MembershipProvider};
use crate::policy::Policy;
use async_trait::async_trait;
use chorus_api::{GroupId, UserId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

struct CountingProvider {
    inner: InMemoryMembership,
    member_loads: AtomicUsize,
    group_loads: AtomicUsize,
}

impl CountingProvider {
    fn new(inner: InMemoryMembership) -> Self {
        Self {
            inner,
            member_loads: AtomicUsize::new(0),
            group_loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MembershipProvider for CountingProvider {
    async fn members_of(&self, g: &GroupId) -> Result<Vec<UserId>, CoreError> {
        self.member_loads.fetch_add(1, Ordering::SeqCst);
        self.inner.members_of(g).await
    }

    async fn groups_of(&self, u: &UserId) -> Result<Vec<GroupId>, CoreError> {
        self.group_loads.fetch_add(1, Ordering::SeqCst);
        self.inner.groups_of(u).await
    }
}

#[tokio::test]
async fn repeated_lookups_hit_the_cache() {
    let backing = InMemoryMembership::new();
    backing
        .set_members(group("g1"), vec![user("a"), user("b")])
        .await;
    let provider = Arc::new(CountingProvider::new(backing));
    let cache = MembershipCache::new(provider.clone(), &fast_policy());

    for _ in 0..5 {
        let members = cache.members_of(&group("g1")).await.expect("members");
        assert_eq!(members.len(), 2);
    }
    assert_eq!(provider.member_loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn negative_entry_suppresses_stampede_on_missing_group() {
    let provider = Arc::new(CountingProvider::new(InMemoryMembership::new()));
    let cache = MembershipCache::new(provider.clone(), &fast_policy());

    for _ in 0..5 {
        let members = cache.members_of(&group("ghost")).await.expect("members");
        assert!(members.is_empty());
    }
    assert_eq!(provider.member_loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn negative_entry_expires_sooner() {
    let policy = Policy {
        negative_cache_ttl_ms: 20,
        ..fast_policy()
    };
    let backing = InMemoryMembership::new();
    let provider = Arc::new(CountingProvider::new(backing.clone()));
    let cache = MembershipCache::new(provider.clone(), &policy);

    assert!(cache.members_of(&group("g1")).await.expect("members").is_empty());

    // The group appears while the negative entry is still live.
    backing.set_members(group("g1"), vec![user("a")]).await;
    assert!(cache.members_of(&group("g1")).await.expect("members").is_empty());

    sleep(Duration::from_millis(40)).await;
    let members = cache.members_of(&group("g1")).await.expect("members");
    assert_eq!(members, vec![user("a")]);
    assert_eq!(provider.member_loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidation_makes_mutations_visible_immediately() {
    let backing = InMemoryMembership::new();
    backing
        .set_members(group("g1"), vec![user("a"), user("b"), user("c")])
        .await;
    let provider = Arc::new(CountingProvider::new(backing.clone()));
    let cache = MembershipCache::new(provider.clone(), &fast_policy());

    assert_eq!(cache.members_of(&group("g1")).await.expect("members").len(), 3);

    backing.remove_member(&group("g1"), &user("c")).await;
    // Stale until the membership subsystem invalidates.
    assert_eq!(cache.members_of(&group("g1")).await.expect("members").len(), 3);

    cache.invalidate_group(&group("g1")).await;
    assert_eq!(cache.members_of(&group("g1")).await.expect("members").len(), 2);
}

#[tokio::test]
async fn user_groups_are_cached_and_invalidated() {
    let backing = InMemoryMembership::new();
    backing.set_members(group("g1"), vec![user("a")]).await;
    backing.set_members(group("g2"), vec![user("a"), user("b")]).await;
    let provider = Arc::new(CountingProvider::new(backing.clone()));
    let cache = MembershipCache::new(provider.clone(), &fast_policy());

    let mut groups = cache.groups_of(&user("a")).await.expect("groups");
    groups.sort_by(|x, y| x.value.cmp(&y.value));
    assert_eq!(groups, vec![group("g1"), group("g2")]);

    cache.groups_of(&user("a")).await.expect("groups");
    assert_eq!(provider.group_loads.load(Ordering::SeqCst), 1);

    backing.remove_member(&group("g1"), &user("a")).await;
    cache.invalidate_user(&user("a")).await;
    assert_eq!(cache.groups_of(&user("a")).await.expect("groups"), vec![group("g2")]);
}
