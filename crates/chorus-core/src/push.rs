use crate::time::now_ms;
use chorus_api::UserId;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

pub type SessionId = Uuid;

struct SessionSlot {
    session_id: SessionId,
    queue: mpsc::Sender<String>,
}

/// Single-process registry of live push sessions.
///
/// Dispatch shares the read guard; register/unregister and queue-full
/// eviction take the write guard. Each session owns a bounded outbound queue;
/// a full queue marks the session stuck and it is removed, dropping only that
/// payload for that session. The log store append has already succeeded, so
/// the client recovers the missed message by pulling on reconnect.
pub struct PushRegistry {
    sessions: RwLock<HashMap<UserId, Vec<SessionSlot>>>,
    last_online: Mutex<HashMap<UserId, u64>>,
    queue_len: usize,
}

impl PushRegistry {
    pub fn new(queue_len: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            last_online: Mutex::new(HashMap::new()),
            queue_len,
        })
    }

    /// Adds a session under `user` and returns the receiving half of its
    /// outbound queue for the session's writer task to drain.
    pub async fn register(&self, user: &UserId, session_id: SessionId) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.queue_len);
        let mut guard = self.sessions.write().await;
        guard.entry(user.clone()).or_default().push(SessionSlot {
            session_id,
            queue: tx,
        });
        drop(guard);
        self.last_online.lock().await.insert(user.clone(), now_ms());
        debug!("push session {} registered for {}", session_id, user);
        rx
    }

    /// Removes a session; dropping its queue sender ends the writer task on
    /// its next receive.
    pub async fn unregister(&self, user: &UserId, session_id: SessionId) {
        let mut guard = self.sessions.write().await;
        if let Some(slots) = guard.get_mut(user) {
            slots.retain(|slot| slot.session_id != session_id);
            if slots.is_empty() {
                guard.remove(user);
            }
        }
        drop(guard);
        self.last_online.lock().await.insert(user.clone(), now_ms());
        debug!("push session {} unregistered for {}", session_id, user);
    }

    /// Enqueues `payload` on every live session of `user` without blocking.
    /// Returns the number of sessions reached. A no-op for users with no
    /// sessions.
    pub async fn dispatch(&self, user: &UserId, payload: &str) -> usize {
        let mut delivered = 0;
        let mut stuck = Vec::new();
        {
            let guard = self.sessions.read().await;
            let Some(slots) = guard.get(user) else {
                return 0;
            };
            for slot in slots {
                match slot.queue.try_send(payload.to_string()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            "push session {} for {} stuck with a full queue, evicting",
                            slot.session_id, user
                        );
                        stuck.push(slot.session_id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => stuck.push(slot.session_id),
                }
            }
        }
        for session_id in stuck {
            self.unregister(user, session_id).await;
        }
        delivered
    }

    pub async fn is_online(&self, user: &UserId) -> bool {
        self.session_count(user).await > 0
    }

    pub async fn session_count(&self, user: &UserId) -> usize {
        let guard = self.sessions.read().await;
        guard.get(user).map(|slots| slots.len()).unwrap_or(0)
    }

    /// Millisecond timestamp of the user's most recent connect or disconnect.
    pub async fn last_online_ms(&self, user: &UserId) -> Option<u64> {
        self.last_online.lock().await.get(user).copied()
    }
}
