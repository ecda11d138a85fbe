//! ChannelStore interface tests.
//!
//! These tests verify the contract of the ChannelStore trait.
//! Each storage implementation should run these tests.

use uuid::Uuid;

use ledgerline::storage::{ChannelStore, EventRecord, StorageError};
use ledgerline::Document;

/// Unique channel name so tests can share one database.
pub fn channel(prefix: &str) -> String {
    format!("test_{}_{}", prefix, Uuid::new_v4().simple())
}

/// Create a record carrying a small document.
pub fn make_record(sequence: u64, event_type: &str) -> EventRecord {
    EventRecord {
        sequence,
        event_type: event_type.to_string(),
        created_at: chrono::Utc::now(),
        data: Document::new()
            .put("sequence", sequence)
            .put("type", event_type)
            .encode()
            .expect("encode should succeed"),
    }
}

// =============================================================================
// Provisioning
// =============================================================================

pub async fn test_exists_before_and_after_create<S: ChannelStore>(store: &S) {
    let name = channel("exists");

    assert!(!store.exists(&name).await.expect("exists should succeed"));
    store.create(&name).await.expect("create should succeed");
    assert!(store.exists(&name).await.expect("exists should succeed"));
}

pub async fn test_create_is_idempotent<S: ChannelStore>(store: &S) {
    let name = channel("create_twice");

    let handle = store.create(&name).await.expect("create should succeed");
    store
        .put(&handle, &make_record(0, "Created"))
        .await
        .expect("put should succeed");

    let again = store.create(&name).await.expect("second create should succeed");
    assert_eq!(again.name(), handle.name());
    assert_eq!(
        store.max_sequence(&again).await.expect("max should succeed"),
        Some(0),
        "re-creating must not drop events"
    );
}

pub async fn test_open_missing_channel<S: ChannelStore>(store: &S) {
    let name = channel("missing");

    let result = store.open(&name).await;
    assert!(
        matches!(result, Err(StorageError::ChannelNotFound(ref n)) if *n == name),
        "open of unknown channel should be ChannelNotFound"
    );
}

pub async fn test_open_existing_channel<S: ChannelStore>(store: &S) {
    let name = channel("open");
    store.create(&name).await.expect("create should succeed");

    let handle = store.open(&name).await.expect("open should succeed");
    assert_eq!(handle.name(), name);
}

// =============================================================================
// Append and read
// =============================================================================

pub async fn test_put_and_get<S: ChannelStore>(store: &S) {
    let name = channel("put_get");
    let handle = store.create(&name).await.expect("create should succeed");
    let record = make_record(0, "Created");

    store.put(&handle, &record).await.expect("put should succeed");

    let read = store
        .get(&handle, 0)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(read.sequence, 0);
    assert_eq!(read.event_type, "Created");
    assert_eq!(read.data, record.data);
    assert_eq!(
        read.created_at.timestamp_millis(),
        record.created_at.timestamp_millis()
    );
    assert_eq!(read.document().unwrap(), record.document().unwrap());
}

pub async fn test_get_missing_sequence<S: ChannelStore>(store: &S) {
    let name = channel("get_missing");
    let handle = store.create(&name).await.expect("create should succeed");

    assert!(store.get(&handle, 7).await.expect("get should succeed").is_none());
}

pub async fn test_put_never_overwrites<S: ChannelStore>(store: &S) {
    let name = channel("overwrite");
    let handle = store.create(&name).await.expect("create should succeed");
    store
        .put(&handle, &make_record(0, "Original"))
        .await
        .expect("put should succeed");

    let result = store.put(&handle, &make_record(0, "Replacement")).await;
    assert!(
        matches!(result, Err(StorageError::SequenceConflict { sequence: 0, .. })),
        "second put at the same sequence should conflict"
    );

    let kept = store.get(&handle, 0).await.unwrap().unwrap();
    assert_eq!(kept.event_type, "Original");
}

pub async fn test_read_from<S: ChannelStore>(store: &S) {
    let name = channel("read_from");
    let handle = store.create(&name).await.expect("create should succeed");
    for seq in 0..5 {
        store
            .put(&handle, &make_record(seq, "Tick"))
            .await
            .expect("put should succeed");
    }

    let all = store.read_from(&handle, 0).await.expect("read should succeed");
    let sequences: Vec<u64> = all.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

    let tail = store.read_from(&handle, 3).await.expect("read should succeed");
    assert_eq!(tail.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![3, 4]);

    let past_end = store.read_from(&handle, 10).await.expect("read should succeed");
    assert!(past_end.is_empty());
}

pub async fn test_max_sequence<S: ChannelStore>(store: &S) {
    let name = channel("max_seq");
    let handle = store.create(&name).await.expect("create should succeed");

    assert_eq!(store.max_sequence(&handle).await.unwrap(), None);

    for seq in 0..3 {
        store.put(&handle, &make_record(seq, "Tick")).await.unwrap();
    }
    assert_eq!(store.max_sequence(&handle).await.unwrap(), Some(2));
}

pub async fn test_channels_are_isolated<S: ChannelStore>(store: &S) {
    let a = store.create(&channel("iso_a")).await.unwrap();
    let b = store.create(&channel("iso_b")).await.unwrap();

    store.put(&a, &make_record(0, "A")).await.unwrap();
    store.put(&b, &make_record(0, "B")).await.unwrap();
    store.put(&b, &make_record(1, "B")).await.unwrap();

    assert_eq!(store.max_sequence(&a).await.unwrap(), Some(0));
    assert_eq!(store.max_sequence(&b).await.unwrap(), Some(1));
    assert_eq!(store.get(&a, 0).await.unwrap().unwrap().event_type, "A");
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all ChannelStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_channel_store_tests {
    ($store:expr) => {
        use $crate::storage::channel_store_tests::*;

        test_exists_before_and_after_create($store).await;
        println!("  test_exists_before_and_after_create: PASSED");

        test_create_is_idempotent($store).await;
        println!("  test_create_is_idempotent: PASSED");

        test_open_missing_channel($store).await;
        println!("  test_open_missing_channel: PASSED");

        test_open_existing_channel($store).await;
        println!("  test_open_existing_channel: PASSED");

        test_put_and_get($store).await;
        println!("  test_put_and_get: PASSED");

        test_get_missing_sequence($store).await;
        println!("  test_get_missing_sequence: PASSED");

        test_put_never_overwrites($store).await;
        println!("  test_put_never_overwrites: PASSED");

        test_read_from($store).await;
        println!("  test_read_from: PASSED");

        test_max_sequence($store).await;
        println!("  test_max_sequence: PASSED");

        test_channels_are_isolated($store).await;
        println!("  test_channels_are_isolated: PASSED");
    };
}
