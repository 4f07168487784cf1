use super::user;
use crate::bus::{run_dispatcher, InMemoryBus, NotificationBus, NotificationStream};
use crate::error::CoreError;
use crate::push::PushRegistry;
use async_trait::async_trait;
use chorus_api::{MessageId, Notification};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

fn private_notification(to: &str, content: &str) -> Notification {
    Notification::Private {
        msg_id: MessageId::random(),
        to_user_id: user(to),
        from_user_id: user("sender"),
        content: content.to_string(),
        created_at: 1,
    }
}

#[tokio::test]
async fn publish_subscribe_roundtrip() {
    let bus = InMemoryBus::new(16);
    let mut stream = bus.subscribe();

    let sent = private_notification("u2", "hi");
    bus.publish(&sent).await.expect("publish");

    let payload = stream.recv().await.expect("payload");
    let decoded: Notification = serde_json::from_str(&payload).expect("decode");
    assert_eq!(decoded, sent);
}

#[tokio::test]
async fn publish_without_subscribers_is_fine() {
    let bus = InMemoryBus::new(16);
    bus.publish(&private_notification("u2", "unseen"))
        .await
        .expect("publish");
}

#[tokio::test]
async fn late_subscriber_misses_earlier_payloads() {
    let bus = InMemoryBus::new(16);
    bus.publish(&private_notification("u2", "before"))
        .await
        .expect("publish");

    let mut stream = bus.subscribe();
    bus.publish(&private_notification("u2", "after"))
        .await
        .expect("publish");

    let payload = stream.recv().await.expect("payload");
    assert!(payload.contains("after"));
}

/// Bus double that lets tests inject raw payloads the way a foreign producer
/// on the shared topic could.
struct RawBus {
    tx: broadcast::Sender<String>,
}

impl RawBus {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    fn publish_raw(&self, payload: &str) {
        let _ = self.tx.send(payload.to_string());
    }
}

#[async_trait]
impl NotificationBus for RawBus {
    async fn publish(&self, notification: &Notification) -> Result<(), CoreError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        self.publish_raw(&payload);
        Ok(())
    }

    fn subscribe(&self) -> NotificationStream {
        NotificationStream::new(self.tx.subscribe())
    }
}

#[tokio::test]
async fn dispatcher_drops_unknown_and_malformed_payloads() {
    let bus = RawBus::new();
    let registry = PushRegistry::new(8);
    let mut queue = registry.register(&user("u2"), uuid::Uuid::new_v4()).await;
    let dispatcher = run_dispatcher(&bus, registry.clone());

    bus.publish_raw("{not json");
    bus.publish_raw("{\"type\":\"typing\",\"to_user_id\":\"u2\"}");
    bus.publish(&private_notification("u2", "real"))
        .await
        .expect("publish");

    let delivered = timeout(Duration::from_secs(2), queue.recv())
        .await
        .expect("deadline")
        .expect("open");
    assert!(delivered.contains("real"));
    assert!(queue.try_recv().is_err());

    dispatcher.abort();
}

#[tokio::test]
async fn dispatcher_routes_by_recipient() {
    let bus = InMemoryBus::new(16);
    let registry = PushRegistry::new(8);
    let mut for_u2 = registry.register(&user("u2"), uuid::Uuid::new_v4()).await;
    let mut for_u3 = registry.register(&user("u3"), uuid::Uuid::new_v4()).await;
    let dispatcher = run_dispatcher(&bus, registry.clone());

    bus.publish(&private_notification("u3", "only u3"))
        .await
        .expect("publish");

    let delivered = timeout(Duration::from_secs(2), for_u3.recv())
        .await
        .expect("deadline")
        .expect("open");
    assert!(delivered.contains("only u3"));
    assert!(for_u2.try_recv().is_err());

    dispatcher.abort();
}

#[tokio::test]
async fn lagged_reader_skips_and_continues() {
    let bus = InMemoryBus::new(2);
    let mut stream = bus.subscribe();

    for i in 0..10 {
        bus.publish(&private_notification("u2", &format!("m{}", i)))
            .await
            .expect("publish");
    }

    // The reader fell behind a 2-slot buffer; it must surface the survivors
    // rather than end the stream.
    let payload = stream.recv().await.expect("payload");
    assert!(payload.contains("m8") || payload.contains("m9"));
}
