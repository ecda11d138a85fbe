//! BinderStore interface tests.
//!
//! These tests verify the contract of the BinderStore and Binder traits.
//! Each storage implementation should run these tests.

use futures::StreamExt;
use uuid::Uuid;

use ledgerline::storage::{Binder, BinderStore};
use ledgerline::Document;

fn binder_name(prefix: &str) -> String {
    format!("test_{}_{}", prefix, Uuid::new_v4().simple())
}

// =============================================================================
// Binder registry
// =============================================================================

pub async fn test_get_requires_open<S: BinderStore>(store: &S) {
    let name = binder_name("get_open");

    assert!(store.get(&name).is_none(), "unopened binder should not resolve");
    store.open(&name).await.expect("open should succeed");
    let found = store.get(&name).expect("opened binder should resolve");
    assert_eq!(found.name(), name);
}

pub async fn test_open_twice_shares_contents<S: BinderStore>(store: &S) {
    let name = binder_name("open_twice");

    let first = store.open(&name).await.expect("open should succeed");
    first
        .put("k", &Document::new().put("v", 1))
        .await
        .expect("put should succeed");

    let second = store.open(&name).await.expect("second open should succeed");
    let doc = second.get("k").await.expect("get should succeed");
    assert_eq!(doc, Some(Document::new().put("v", 1)));
}

pub async fn test_binder_names_lists_opened<S: BinderStore>(store: &S) {
    let name = binder_name("names");
    store.open(&name).await.expect("open should succeed");

    let names = store.binder_names().await.expect("names should succeed");
    assert!(names.contains(&name));
}

// =============================================================================
// Binder operations
// =============================================================================

pub async fn test_put_get_delete<S: BinderStore>(store: &S) {
    let binder = store.open(&binder_name("crud")).await.unwrap();
    let doc = Document::new()
        .put("name", "Ada")
        .put("tags", serde_json::json!(["a", "b"]))
        .put("address", serde_json::json!({"city": "London"}));

    binder.put("c-1", &doc).await.expect("put should succeed");
    assert_eq!(binder.get("c-1").await.unwrap(), Some(doc));

    assert!(binder.delete("c-1").await.expect("delete should succeed"));
    assert!(!binder.delete("c-1").await.expect("delete should succeed"));
    assert_eq!(binder.get("c-1").await.unwrap(), None);
}

pub async fn test_put_replaces<S: BinderStore>(store: &S) {
    let binder = store.open(&binder_name("replace")).await.unwrap();

    binder.put("k", &Document::new().put("v", 1)).await.unwrap();
    binder.put("k", &Document::new().put("v", 2)).await.unwrap();

    let doc = binder.get("k").await.unwrap().unwrap();
    assert_eq!(doc.get_i64("v"), Some(2));
}

pub async fn test_iterate_yields_all_entries_in_key_order<S: BinderStore>(store: &S) {
    let binder = store.open(&binder_name("iterate")).await.unwrap();
    for key in ["k3", "k1", "k2"] {
        binder
            .put(key, &Document::new().put("key", key))
            .await
            .unwrap();
    }

    let entries: Vec<(String, Document)> = binder
        .iterate()
        .map(|entry| entry.expect("iteration should succeed"))
        .collect()
        .await;
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["k1", "k2", "k3"]);
    assert_eq!(entries[0].1.get_str("key"), Some("k1"));
}

pub async fn test_iterate_many_entries<S: BinderStore>(store: &S) {
    let binder = store.open(&binder_name("iterate_many")).await.unwrap();
    for i in 0..600 {
        binder
            .put(&format!("key-{:04}", i), &Document::new().put("i", i))
            .await
            .unwrap();
    }

    let count = binder.iterate().count().await;
    assert_eq!(count, 600);
}

pub async fn test_binders_are_isolated<S: BinderStore>(store: &S) {
    let a = store.open(&binder_name("iso_a")).await.unwrap();
    let b = store.open(&binder_name("iso_b")).await.unwrap();

    a.put("shared", &Document::new().put("owner", "a")).await.unwrap();

    assert!(b.get("shared").await.unwrap().is_none());
    assert_eq!(b.iterate().count().await, 0);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all BinderStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_binder_store_tests {
    ($store:expr) => {
        use $crate::storage::binder_store_tests::*;

        test_get_requires_open($store).await;
        println!("  test_get_requires_open: PASSED");

        test_open_twice_shares_contents($store).await;
        println!("  test_open_twice_shares_contents: PASSED");

        test_binder_names_lists_opened($store).await;
        println!("  test_binder_names_lists_opened: PASSED");

        test_put_get_delete($store).await;
        println!("  test_put_get_delete: PASSED");

        test_put_replaces($store).await;
        println!("  test_put_replaces: PASSED");

        test_iterate_yields_all_entries_in_key_order($store).await;
        println!("  test_iterate_yields_all_entries_in_key_order: PASSED");

        test_iterate_many_entries($store).await;
        println!("  test_iterate_many_entries: PASSED");

        test_binders_are_isolated($store).await;
        println!("  test_binders_are_isolated: PASSED");
    };
}
