use super::{group, group_record, harness, private_record, private_req, user};
use crate::cursor::CursorStore;
use crate::error::CoreError;
use crate::log_store::LogStore;
use chorus_api::{
    CursorConversationType, PeerProfile, PullRequest, StreamId, UpdateCursorRequest,
};

fn pull_all() -> PullRequest {
    PullRequest {
        from_stream_id: None,
        limit_per_conversation: None,
    }
}

#[tokio::test]
async fn empty_log_pulls_empty() {
    let h = harness();
    let pulled = h.core.pull(&user("u2"), &pull_all()).await.expect("pull");
    assert!(pulled.conversations.is_empty());
    assert_eq!(pulled.total_unread, 0);
}

#[tokio::test]
async fn private_happy_path_roundtrip() {
    let h = harness();
    let receipt = h
        .core
        .send_private(private_req("u1", "u2", "hi"))
        .await
        .expect("send");

    let pulled = h.core.pull(&user("u2"), &pull_all()).await.expect("pull");
    assert_eq!(pulled.conversations.len(), 1);
    assert_eq!(pulled.total_unread, 1);
    let conversation = &pulled.conversations[0];
    assert_eq!(conversation.conversation.to_string(), "private:u1");
    assert_eq!(conversation.unread_count, 1);
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].id, receipt.message_id);
    assert_eq!(conversation.messages[0].content, "hi");

    h.core
        .update_cursor(UpdateCursorRequest {
            user: user("u2"),
            last_seen_stream_id: conversation.messages[0].stream_id,
            conversation_type: CursorConversationType::Private,
            peer_id: Some("u1".to_string()),
            last_read_message_id: None,
        })
        .await
        .expect("ack");

    let after_ack = h.core.pull(&user("u2"), &pull_all()).await.expect("pull");
    assert!(after_ack.conversations.is_empty());
    assert_eq!(after_ack.total_unread, 0);
}

#[tokio::test]
async fn pull_does_not_advance_the_cursor() {
    let h = harness();
    h.core
        .send_private(private_req("u1", "u2", "hi"))
        .await
        .expect("send");

    let first = h.core.pull(&user("u2"), &pull_all()).await.expect("pull");
    let second = h.core.pull(&user("u2"), &pull_all()).await.expect("pull");
    assert_eq!(first, second);
    assert_eq!(second.total_unread, 1);
}

#[tokio::test]
async fn reconnect_recovery_buckets_by_conversation() {
    let h = harness();
    for i in 0..5 {
        h.core
            .send_private(private_req("a", "u", &format!("a{}", i)))
            .await
            .expect("send");
    }
    for i in 0..5 {
        h.core
            .send_private(private_req("b", "u", &format!("b{}", i)))
            .await
            .expect("send");
    }

    let pulled = h.core.pull(&user("u"), &pull_all()).await.expect("pull");
    assert_eq!(pulled.conversations.len(), 2);
    assert_eq!(pulled.total_unread, 10);
    for conversation in &pulled.conversations {
        assert_eq!(conversation.unread_count, 5);
        // Log order within each bucket.
        assert!(conversation
            .messages
            .windows(2)
            .all(|pair| pair[0].stream_id < pair[1].stream_id));
    }

    let highest = pulled
        .conversations
        .iter()
        .flat_map(|c| c.messages.iter())
        .map(|m| m.stream_id)
        .max()
        .expect("messages");
    h.core
        .update_cursor(UpdateCursorRequest {
            user: user("u"),
            last_seen_stream_id: highest,
            conversation_type: CursorConversationType::Empty,
            peer_id: None,
            last_read_message_id: None,
        })
        .await
        .expect("ack");

    let after_ack = h.core.pull(&user("u"), &pull_all()).await.expect("pull");
    assert!(after_ack.conversations.is_empty());
}

#[tokio::test]
async fn per_conversation_cap_leaves_overflow_for_next_pull() {
    let h = harness();
    for i in 0..3 {
        h.core
            .send_private(private_req("u1", "u2", &format!("m{}", i)))
            .await
            .expect("send");
    }

    let capped = PullRequest {
        from_stream_id: None,
        limit_per_conversation: Some(2),
    };
    let first = h.core.pull(&user("u2"), &capped).await.expect("pull");
    let conversation = &first.conversations[0];
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.unread_count, 2);
    assert_eq!(conversation.messages[0].content, "m0");
    assert_eq!(conversation.messages[1].content, "m1");

    h.core
        .update_cursor(UpdateCursorRequest {
            user: user("u2"),
            last_seen_stream_id: conversation.messages[1].stream_id,
            conversation_type: CursorConversationType::Private,
            peer_id: Some("u1".to_string()),
            last_read_message_id: None,
        })
        .await
        .expect("ack");

    let second = h.core.pull(&user("u2"), &capped).await.expect("pull");
    assert_eq!(second.conversations.len(), 1);
    assert_eq!(second.conversations[0].messages.len(), 1);
    assert_eq!(second.conversations[0].messages[0].content, "m2");
}

#[tokio::test]
async fn stale_ack_does_not_resurface_messages() {
    let h = harness();
    h.core
        .send_private(private_req("u1", "u2", "hi"))
        .await
        .expect("send");
    let pulled = h.core.pull(&user("u2"), &pull_all()).await.expect("pull");
    let seen = pulled.conversations[0].messages[0].stream_id;

    h.core
        .update_cursor(UpdateCursorRequest {
            user: user("u2"),
            last_seen_stream_id: seen,
            conversation_type: CursorConversationType::Empty,
            peer_id: None,
            last_read_message_id: None,
        })
        .await
        .expect("ack");

    // A delayed, lower ack must not rewind the cursor.
    h.core
        .update_cursor(UpdateCursorRequest {
            user: user("u2"),
            last_seen_stream_id: StreamId::new(1, 0),
            conversation_type: CursorConversationType::Empty,
            peer_id: None,
            last_read_message_id: None,
        })
        .await
        .expect("stale ack");

    let after = h.core.pull(&user("u2"), &pull_all()).await.expect("pull");
    assert!(after.conversations.is_empty());
}

#[tokio::test]
async fn buckets_sort_by_latest_activity_descending() {
    let h = harness();
    let owner = user("u");
    // Seed the log directly to control created_at.
    h.log
        .append(&owner, private_record("a", "u", "old", 1_000))
        .await
        .expect("append");
    h.log
        .append(&owner, group_record("b", "g1", "newer", 3_000))
        .await
        .expect("append");
    h.log
        .append(&owner, private_record("c", "u", "middle", 2_000))
        .await
        .expect("append");

    let pulled = h.core.pull(&owner, &pull_all()).await.expect("pull");
    let keys: Vec<String> = pulled
        .conversations
        .iter()
        .map(|c| c.conversation.to_string())
        .collect();
    assert_eq!(keys, vec!["group:g1", "private:c", "private:a"]);
    assert_eq!(pulled.conversations[0].last_activity_ms, 3_000);
}

#[tokio::test]
async fn enrichment_is_best_effort() {
    let h = harness();
    h.directory
        .put_user(
            user("u1"),
            PeerProfile {
                title: Some("Alice".to_string()),
                avatar: Some("https://cdn/alice.png".to_string()),
            },
        )
        .await;
    h.membership
        .set_members(group("g1"), vec![user("u1"), user("u2")])
        .await;

    h.core
        .send_private(private_req("u1", "u2", "hi"))
        .await
        .expect("send");
    h.core
        .send_group(super::group_req("u1", "g1", "yo"))
        .await
        .expect("send");

    let pulled = h.core.pull(&user("u2"), &pull_all()).await.expect("pull");
    assert_eq!(pulled.conversations.len(), 2);
    for conversation in &pulled.conversations {
        match conversation.conversation.to_string().as_str() {
            "private:u1" => assert_eq!(conversation.peer.title.as_deref(), Some("Alice")),
            // No directory entry for the group: profile stays empty, pull
            // still succeeds.
            "group:g1" => assert_eq!(conversation.peer, PeerProfile::default()),
            other => panic!("unexpected conversation {}", other),
        }
    }
}

#[tokio::test]
async fn explicit_from_stream_id_overrides_cursor() {
    let h = harness();
    let mut stream_ids = Vec::new();
    for i in 0..3 {
        let receipt = h
            .core
            .send_private(private_req("u1", "u2", &format!("m{}", i)))
            .await
            .expect("send");
        stream_ids.push(receipt.stream_id.expect("stream id"));
    }

    let from_second = PullRequest {
        from_stream_id: Some(stream_ids[1]),
        limit_per_conversation: None,
    };
    let pulled = h.core.pull(&user("u2"), &from_second).await.expect("pull");
    assert_eq!(pulled.total_unread, 1);
    assert_eq!(pulled.conversations[0].messages[0].content, "m2");
}

#[tokio::test]
async fn pull_rejects_out_of_range_limit() {
    let h = harness();
    let req = PullRequest {
        from_stream_id: None,
        limit_per_conversation: Some(0),
    };
    assert!(matches!(
        h.core.pull(&user("u2"), &req).await,
        Err(CoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn group_ack_records_read_marker() {
    let h = harness();
    h.membership
        .set_members(group("g1"), vec![user("a"), user("b")])
        .await;
    let receipt = h
        .core
        .send_group(super::group_req("a", "g1", "y"))
        .await
        .expect("send");

    let pulled = h.core.pull(&user("b"), &pull_all()).await.expect("pull");
    let seen = pulled.conversations[0].messages[0].stream_id;

    h.core
        .update_cursor(UpdateCursorRequest {
            user: user("b"),
            last_seen_stream_id: seen,
            conversation_type: CursorConversationType::Group,
            peer_id: Some("g1".to_string()),
            last_read_message_id: Some(receipt.message_id.clone()),
        })
        .await
        .expect("ack");

    let marker = h
        .cursors
        .group_read(&group("g1"), &user("b"))
        .await
        .expect("read");
    assert_eq!(marker, Some(receipt.message_id.clone()));

    let mirror = h.mirror.clone();
    h.core.shutdown().await;
    let durable = mirror.group_read_marker(&group("g1"), &user("b")).await;
    assert_eq!(durable.map(|(id, _)| id), Some(receipt.message_id));
}

#[tokio::test]
async fn private_ack_with_marker_mirrors_read_state() {
    let h = harness();
    let receipt = h
        .core
        .send_private(private_req("u1", "u2", "hi"))
        .await
        .expect("send");

    h.core
        .update_cursor(UpdateCursorRequest {
            user: user("u2"),
            last_seen_stream_id: receipt.stream_id.expect("stream id"),
            conversation_type: CursorConversationType::Private,
            peer_id: Some("u1".to_string()),
            last_read_message_id: Some(receipt.message_id.clone()),
        })
        .await
        .expect("ack");

    let mirror = h.mirror.clone();
    h.core.shutdown().await;
    assert!(mirror.private_read_at(&receipt.message_id).await.is_some());
}
