use super::{group, user};
use crate::cursor::{CursorStore, InMemoryCursorStore};
use chorus_api::{MessageId, StreamId};

#[tokio::test]
async fn unset_cursor_reads_as_beginning_sentinel() {
    let store = InMemoryCursorStore::new();
    let cursor = store.get(&user("u1")).await.expect("get");
    assert_eq!(cursor, StreamId::ZERO);
    assert_eq!(cursor.to_string(), "0-0");
}

#[tokio::test]
async fn advance_never_moves_backwards() {
    let store = InMemoryCursorStore::new();
    let owner = user("u1");

    let effective = store
        .advance(&owner, StreamId::new(100, 2))
        .await
        .expect("advance");
    assert_eq!(effective, StreamId::new(100, 2));

    // A stale ack leaves the cursor where it was.
    let effective = store
        .advance(&owner, StreamId::new(50, 9))
        .await
        .expect("advance");
    assert_eq!(effective, StreamId::new(100, 2));
    assert_eq!(store.get(&owner).await.expect("get"), StreamId::new(100, 2));

    let effective = store
        .advance(&owner, StreamId::new(100, 3))
        .await
        .expect("advance");
    assert_eq!(effective, StreamId::new(100, 3));
}

#[tokio::test]
async fn cursors_are_isolated_per_user() {
    let store = InMemoryCursorStore::new();
    store
        .advance(&user("u1"), StreamId::new(10, 0))
        .await
        .expect("advance");
    assert_eq!(store.get(&user("u2")).await.expect("get"), StreamId::ZERO);
}

#[tokio::test]
async fn group_read_marker_upserts() {
    let store = InMemoryCursorStore::new();
    let g = group("g1");
    let reader = user("u1");

    assert_eq!(store.group_read(&g, &reader).await.expect("read"), None);

    let first = MessageId::random();
    store
        .set_group_read(&g, &reader, &first)
        .await
        .expect("set");
    assert_eq!(
        store.group_read(&g, &reader).await.expect("read"),
        Some(first)
    );

    let second = MessageId::random();
    store
        .set_group_read(&g, &reader, &second)
        .await
        .expect("set");
    assert_eq!(
        store.group_read(&g, &reader).await.expect("read"),
        Some(second)
    );

    // Other members of the same group are untouched.
    assert_eq!(store.group_read(&g, &user("u2")).await.expect("read"), None);
}
