//! Mock storage contract tests.
//!
//! Run with: cargo test --test storage_mock
//!
//! The in-memory backends back most unit tests, so they are held to the
//! same interface contract as the durable ones.

mod storage;

use ledgerline::storage::{MockBinderStore, MockChannelStore};

#[tokio::test]
async fn test_mock_channel_store() {
    println!("=== Mock ChannelStore Tests ===");

    let store = MockChannelStore::new();
    run_channel_store_tests!(&store);

    println!("=== All Mock ChannelStore tests PASSED ===");
}

#[tokio::test]
async fn test_mock_binder_store() {
    println!("=== Mock BinderStore Tests ===");

    let store = MockBinderStore::new();
    run_binder_store_tests!(&store);

    println!("=== All Mock BinderStore tests PASSED ===");
}
