//! Restart simulation over a file-backed SQLite database.
//!
//! Run with: cargo test --test restart --features sqlite
//!
//! Each "process" is a broker built from the same configuration; closing
//! one and building another reopens the database from disk.

use std::time::Duration;

use futures::StreamExt;
use tempfile::TempDir;
use tokio::sync::mpsc;

use ledgerline::config::{Config, SqliteConfig, StorageConfig, StorageType};
use ledgerline::storage::Binder;
use ledgerline::{Broker, Document, ReceivedEvent, StartPosition};

fn file_config(dir: &TempDir) -> Config {
    let path = dir.path().join("ledgerline.db");
    Config {
        storage: StorageConfig {
            storage_type: StorageType::Sqlite,
            sqlite: SqliteConfig::file(path.to_string_lossy().into_owned()),
        },
        ..Config::default()
    }
}

async fn start(config: &Config) -> Broker {
    Broker::from_config(config)
        .await
        .expect("broker should start")
}

#[tokio::test]
async fn test_sequence_resumes_after_restart() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);

    let broker = start(&config).await;
    for i in 0..3 {
        let seq = broker
            .publish_sync("orders", Document::new().put("n", i))
            .await;
        assert_eq!(seq, Some(i));
    }
    broker.close().await;

    let broker = start(&config).await;
    assert_eq!(
        broker.publish_sync("orders", Document::new().put("n", 3)).await,
        Some(3),
        "first append after restart must follow the persisted events"
    );

    for i in 0..3 {
        let event = broker
            .sink()
            .read("orders", i)
            .await
            .unwrap()
            .expect("persisted event should survive restart");
        assert_eq!(event.document().get_u64("n"), Some(i));
    }
    broker.close().await;
}

#[tokio::test]
async fn test_document_round_trip_through_storage() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let original = Document::new()
        .put("id", "order-1")
        .put("total", 99.95)
        .put("paid", true)
        .put("lines", serde_json::json!([{"sku": "a-1", "qty": 3}]))
        .put("shipping", serde_json::json!({"city": "Lisbon", "zip": null}));

    let broker = start(&config).await;
    let seq = broker
        .publish_sync_as("orders", "OrderPlaced", original.clone())
        .await
        .unwrap();
    broker.close().await;

    let broker = start(&config).await;
    let event = broker.sink().read("orders", seq).await.unwrap().unwrap();
    assert_eq!(event.document(), &original);
    assert_eq!(event.event_type(), "OrderPlaced");
    broker.close().await;
}

#[tokio::test]
async fn test_replay_after_restart() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);

    let broker = start(&config).await;
    for i in 0..4 {
        broker
            .publish_sync("audit", Document::new().put("n", i))
            .await
            .unwrap();
    }
    broker.close().await;

    let broker = start(&config).await;
    let subscription = broker
        .subscribe("audit", StartPosition::Beginning)
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    subscription.set_handler(move |event: ReceivedEvent| {
        let _ = tx.send(event.sequence());
    });
    broker
        .publish_sync("audit", Document::new().put("n", 4))
        .await
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..5 {
        let seq = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(seq);
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);

    subscription.unsubscribe();
    broker.close().await;
}

#[tokio::test]
async fn test_binder_contents_survive_restart() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);

    let broker = start(&config).await;
    let binder = broker.open_binder("customers").await.unwrap();
    binder
        .put("c-1", &Document::new().put("Key", 27))
        .await
        .unwrap();
    broker.close().await;

    let broker = start(&config).await;
    broker.open_binder("customers").await.unwrap();
    broker
        .register_query("key-27", "customers", |_, entry| {
            entry.value.get_i64("Key") == Some(27)
        })
        .unwrap();

    let keys: Vec<String> = broker
        .execute_query("key-27", Document::new())
        .unwrap()
        .map(|r| r.unwrap().key)
        .collect()
        .await;
    assert_eq!(keys, vec!["c-1"]);
    broker.close().await;
}
