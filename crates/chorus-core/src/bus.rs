use crate::error::CoreError;
use crate::push::PushRegistry;
use async_trait::async_trait;
use chorus_api::Notification;
use log::warn;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Publish/subscribe channel carrying serialized notifications on the
/// `message_notifications` topic. Delivery is at-most-once with respect to
/// transient subscribers: a push host that was offline when a notification
/// was published never sees it, and the reconnecting client recovers through
/// the pull path instead.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), CoreError>;
    fn subscribe(&self) -> NotificationStream;
}

pub struct NotificationStream {
    rx: broadcast::Receiver<String>,
}

impl NotificationStream {
    pub fn new(rx: broadcast::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Next raw payload; `None` once the bus is closed. A lagged reader skips
    /// the overwritten payloads and keeps going.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("notification reader lagged, {} payloads skipped", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Clone)]
pub struct InMemoryBus {
    tx: broadcast::Sender<String>,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

#[async_trait]
impl NotificationBus for InMemoryBus {
    async fn publish(&self, notification: &Notification) -> Result<(), CoreError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        // No subscribers is fine; the payload is simply unobserved.
        let _ = self.tx.send(payload);
        Ok(())
    }

    fn subscribe(&self) -> NotificationStream {
        NotificationStream::new(self.tx.subscribe())
    }
}

/// Reader loop of a push host: decodes each bus payload strictly and wakes
/// the matching sessions. Unknown or malformed payloads are logged and
/// dropped.
pub fn run_dispatcher(bus: &dyn NotificationBus, registry: Arc<PushRegistry>) -> JoinHandle<()> {
    let mut stream = bus.subscribe();
    tokio::spawn(async move {
        while let Some(payload) = stream.recv().await {
            let notification: Notification = match serde_json::from_str(&payload) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!("dropping undecodable notification payload: {}", err);
                    continue;
                }
            };
            registry.dispatch(notification.to_user(), &payload).await;
        }
    })
}
