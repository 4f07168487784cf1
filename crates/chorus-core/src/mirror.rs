use crate::error::CoreError;
use crate::policy::Policy;
use async_trait::async_trait;
use chorus_api::{GroupId, MessageId, MessageKind, UserId};
use log::warn;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateMessageRow {
    pub id: MessageId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub created_at_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMessageRow {
    pub id: MessageId,
    pub group_id: GroupId,
    pub from_user: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub created_at_ms: u64,
}

/// Durable write-behind of the hot log. Inserts are idempotent on the message
/// id primary key; one row per private message, one canonical row per group
/// message regardless of fan-out width.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn insert_private(&self, row: &PrivateMessageRow) -> Result<(), CoreError>;
    async fn insert_group(&self, row: &GroupMessageRow) -> Result<(), CoreError>;
    async fn mark_private_read(
        &self,
        user: &UserId,
        msg_ids: &[MessageId],
        read_at_ms: u64,
    ) -> Result<(), CoreError>;
    async fn mark_group_read(
        &self,
        group: &GroupId,
        user: &UserId,
        msg_id: &MessageId,
        read_at_ms: u64,
    ) -> Result<(), CoreError>;
}

#[derive(Clone, Debug)]
pub enum MirrorJob {
    Private(PrivateMessageRow),
    Group(GroupMessageRow),
    PrivateRead {
        user: UserId,
        msg_ids: Vec<MessageId>,
        read_at_ms: u64,
    },
    GroupRead {
        group: GroupId,
        user: UserId,
        msg_id: MessageId,
        read_at_ms: u64,
    },
}

/// Bounded-concurrency worker pool draining mirror jobs. Failed writes retry
/// with exponential backoff and jitter up to a small cap; a job that still
/// fails is logged and dropped, never surfaced to the send path; the log
/// store stays authoritative inside the retention window.
pub struct MirrorWriter {
    tx: mpsc::Sender<MirrorJob>,
    workers: Vec<JoinHandle<()>>,
}

impl MirrorWriter {
    pub fn spawn(store: Arc<dyn MirrorStore>, policy: &Policy) -> Self {
        let (tx, rx) = mpsc::channel(policy.mirror_queue_len.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..policy.mirror_workers.max(1))
            .map(|_| {
                let rx = rx.clone();
                let store = store.clone();
                let policy = policy.clone();
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut guard = rx.lock().await;
                            guard.recv().await
                        };
                        let Some(job) = job else {
                            break;
                        };
                        run_job(store.as_ref(), &policy, job).await;
                    }
                })
            })
            .collect();
        Self { tx, workers }
    }

    /// Producer handle for the job queue; cheap to clone into the send path.
    pub fn sender(&self) -> mpsc::Sender<MirrorJob> {
        self.tx.clone()
    }

    /// Hands a job to the pool without blocking the send path. A full queue
    /// drops the job: the mirror is best-effort by contract.
    pub fn enqueue(&self, job: MirrorJob) {
        if let Err(err) = self.tx.try_send(job) {
            warn!("mirror queue rejected job: {}", err);
        }
    }

    /// Closes the queue and waits for in-flight jobs to settle.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_job(store: &dyn MirrorStore, policy: &Policy, job: MirrorJob) {
    let mut tries = 0u32;
    loop {
        tries += 1;
        let attempt = tokio::time::timeout(
            Duration::from_millis(policy.mirror_op_timeout_ms),
            apply(store, &job),
        )
        .await;
        let failure = match attempt {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(_) => "timeout".to_string(),
        };
        if tries >= policy.mirror_max_tries {
            warn!(
                "mirror job dropped after {} tries, last failure: {}",
                tries, failure
            );
            return;
        }
        tokio::time::sleep(backoff_delay(policy, tries)).await;
    }
}

async fn apply(store: &dyn MirrorStore, job: &MirrorJob) -> Result<(), CoreError> {
    match job {
        MirrorJob::Private(row) => store.insert_private(row).await,
        MirrorJob::Group(row) => store.insert_group(row).await,
        MirrorJob::PrivateRead {
            user,
            msg_ids,
            read_at_ms,
        } => store.mark_private_read(user, msg_ids, *read_at_ms).await,
        MirrorJob::GroupRead {
            group,
            user,
            msg_id,
            read_at_ms,
        } => store.mark_group_read(group, user, msg_id, *read_at_ms).await,
    }
}

fn backoff_delay(policy: &Policy, tries: u32) -> Duration {
    let factor = 1u64 << (tries.saturating_sub(1).min(16));
    let base = policy.mirror_backoff_initial_ms.saturating_mul(factor);
    let capped = base.min(policy.mirror_backoff_max_ms);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2 + 1);
    Duration::from_millis(capped + jitter)
}

/// Mirror kept entirely in memory, for tests and embedded deployments.
#[derive(Clone, Default)]
pub struct InMemoryMirror {
    private: Arc<Mutex<HashMap<Uuid, PrivateMessageRow>>>,
    group: Arc<Mutex<HashMap<Uuid, GroupMessageRow>>>,
    private_reads: Arc<Mutex<HashMap<Uuid, u64>>>,
    group_reads: Arc<Mutex<HashMap<(GroupId, UserId), (MessageId, u64)>>>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn private_row(&self, id: &MessageId) -> Option<PrivateMessageRow> {
        self.private.lock().await.get(&id.value).cloned()
    }

    pub async fn group_row(&self, id: &MessageId) -> Option<GroupMessageRow> {
        self.group.lock().await.get(&id.value).cloned()
    }

    pub async fn private_count(&self) -> usize {
        self.private.lock().await.len()
    }

    pub async fn group_count(&self) -> usize {
        self.group.lock().await.len()
    }

    pub async fn private_read_at(&self, id: &MessageId) -> Option<u64> {
        self.private_reads.lock().await.get(&id.value).copied()
    }

    pub async fn group_read_marker(
        &self,
        group: &GroupId,
        user: &UserId,
    ) -> Option<(MessageId, u64)> {
        self.group_reads
            .lock()
            .await
            .get(&(group.clone(), user.clone()))
            .cloned()
    }
}

#[async_trait]
impl MirrorStore for InMemoryMirror {
    async fn insert_private(&self, row: &PrivateMessageRow) -> Result<(), CoreError> {
        self.private
            .lock()
            .await
            .entry(row.id.value)
            .or_insert_with(|| row.clone());
        Ok(())
    }

    async fn insert_group(&self, row: &GroupMessageRow) -> Result<(), CoreError> {
        self.group
            .lock()
            .await
            .entry(row.id.value)
            .or_insert_with(|| row.clone());
        Ok(())
    }

    async fn mark_private_read(
        &self,
        _user: &UserId,
        msg_ids: &[MessageId],
        read_at_ms: u64,
    ) -> Result<(), CoreError> {
        let mut guard = self.private_reads.lock().await;
        for id in msg_ids {
            guard.insert(id.value, read_at_ms);
        }
        Ok(())
    }

    async fn mark_group_read(
        &self,
        group: &GroupId,
        user: &UserId,
        msg_id: &MessageId,
        read_at_ms: u64,
    ) -> Result<(), CoreError> {
        self.group_reads
            .lock()
            .await
            .insert((group.clone(), user.clone()), (msg_id.clone(), read_at_ms));
        Ok(())
    }
}
