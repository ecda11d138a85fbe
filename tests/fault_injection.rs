//! Broker behavior over in-memory stores that fail on demand.
//!
//! Run with: cargo test --test fault_injection --features test-utils

use std::sync::Arc;

use ledgerline::config::DeliveryConfig;
use ledgerline::sink::SinkError;
use ledgerline::storage::{MockBinderStore, MockChannelStore};
use ledgerline::{Broker, Document};

fn broker_over(channels: &Arc<MockChannelStore>) -> Broker {
    Broker::new(
        channels.clone(),
        Arc::new(MockBinderStore::new()),
        DeliveryConfig::default(),
    )
}

#[tokio::test]
async fn test_publish_failures_surface_per_call_style() {
    let channels = Arc::new(MockChannelStore::new());
    let broker = broker_over(&channels);
    assert_eq!(broker.publish_sync("orders", Document::new()).await, Some(0));

    channels.set_fail_on_put(true);
    assert_eq!(broker.publish_sync("orders", Document::new()).await, None);
    assert!(matches!(
        broker.publish_async("orders", Document::new()).await,
        Err(SinkError::Storage(_))
    ));

    channels.set_fail_on_put(false);
    assert_eq!(
        broker.publish_sync("orders", Document::new()).await,
        Some(1),
        "failed appends must not consume sequence numbers"
    );
}

#[tokio::test]
async fn test_unknown_channel_lookups_do_not_provision() {
    let channels = Arc::new(MockChannelStore::new());
    let broker = broker_over(&channels);

    for i in 0..50 {
        let result = broker
            .subscribe(&format!("missing-{}", i), Default::default())
            .await;
        assert!(matches!(result, Err(SinkError::ChannelNotFound(_))));
    }
    assert_eq!(channels.create_calls(), 0);
}

#[tokio::test]
async fn test_restarted_broker_continues_sequence() {
    let channels = Arc::new(MockChannelStore::new());
    let broker = broker_over(&channels);
    for i in 0..4 {
        assert_eq!(
            broker.publish_sync("orders", Document::new().put("n", i)).await,
            Some(i)
        );
    }
    broker.close().await;

    let restarted = Arc::new(channels.snapshot().await);
    let broker = broker_over(&restarted);
    assert_eq!(broker.publish_sync("orders", Document::new()).await, Some(4));
    assert_eq!(restarted.create_calls(), 0);
}
