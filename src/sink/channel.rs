//! Per-channel log state.
//!
//! A `ChannelLog` owns the channel's sequence counter and its subscriber
//! registry. The counter lives behind an async mutex that is held across
//! the persist step, so concurrent appenders to one channel are serialized
//! while appenders to other channels proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Result, SinkError};
use crate::document::Document;
use crate::event::Event;
use crate::storage::{ChannelHandle, ChannelStore, EventRecord, StorageError};
use crate::subscription::{StartPosition, SubscriptionCore};

/// Live subscriptions on one channel.
///
/// Holds weak references only: a subscription that is dropped without
/// unsubscribing is pruned on the next fan-out.
pub(crate) struct SubscriberRegistry {
    channel: String,
    subscribers: Mutex<HashMap<Uuid, Weak<SubscriptionCore>>>,
}

impl SubscriberRegistry {
    fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, subscriber: &Arc<SubscriptionCore>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscriber.id(), Arc::downgrade(subscriber));
    }

    /// Stop routing events to a subscription. Returns whether it was present.
    pub(crate) fn remove(&self, id: &Uuid) -> bool {
        let removed = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            debug!(channel = %self.channel, subscription = %id, "Subscriber removed");
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn fan_out(&self, event: &Arc<Event>) {
        let targets: Vec<Arc<SubscriptionCore>> = {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.retain(|_, weak| weak.strong_count() > 0);
            subscribers.values().filter_map(Weak::upgrade).collect()
        };

        for subscriber in targets {
            subscriber.on_event(Arc::clone(event));
        }
    }
}

/// Durable log state for a single channel.
pub(crate) struct ChannelLog {
    handle: ChannelHandle,
    next_sequence: AsyncMutex<u64>,
    subscribers: Arc<SubscriberRegistry>,
}

impl ChannelLog {
    pub(crate) fn new(handle: ChannelHandle, next_sequence: u64) -> Self {
        let subscribers = Arc::new(SubscriberRegistry::new(handle.name()));
        Self {
            handle,
            next_sequence: AsyncMutex::new(next_sequence),
            subscribers,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.handle.name()
    }

    pub(crate) fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    pub(crate) fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }

    /// Next sequence number that will be assigned.
    pub(crate) async fn next_sequence(&self) -> u64 {
        *self.next_sequence.lock().await
    }

    /// Assign, persist and fan out one event.
    ///
    /// The counter only advances after a successful put, and fan-out happens
    /// before the lock is released so subscribers observe append order.
    pub(crate) async fn append(
        &self,
        store: &dyn ChannelStore,
        event_type: &str,
        document: Document,
    ) -> Result<u64> {
        let data = document.encode()?;

        let mut next = self.next_sequence.lock().await;
        let sequence = *next;
        let record = EventRecord {
            sequence,
            event_type: event_type.to_string(),
            created_at: chrono::Utc::now(),
            data,
        };

        if let Err(e) = store.put(&self.handle, &record).await {
            if let StorageError::SequenceConflict { .. } = e {
                // Another writer got there first; resync so the next append
                // lands after whatever is persisted.
                if let Ok(Some(max)) = store.max_sequence(&self.handle).await {
                    warn!(
                        channel = %self.name(),
                        sequence,
                        recovered_next = max + 1,
                        "Sequence already persisted, counter resynchronized"
                    );
                    *next = max + 1;
                }
            }
            return Err(e.into());
        }
        *next = sequence + 1;

        let event = Arc::new(Event::new(self.name(), &record, document));
        self.subscribers.fan_out(&event);

        Ok(sequence)
    }

    /// Register a subscriber, replaying persisted events first if requested.
    ///
    /// Runs inside the append critical section so no event can slip between
    /// the replayed range and the first live event. Returns the first
    /// sequence number the subscriber will observe.
    pub(crate) async fn attach(
        &self,
        store: &dyn ChannelStore,
        start: StartPosition,
        subscriber: &Arc<SubscriptionCore>,
    ) -> Result<u64> {
        let next = self.next_sequence.lock().await;
        let from = match start {
            StartPosition::Now => *next,
            StartPosition::Beginning => 0,
            StartPosition::Sequence(n) => n,
        };
        subscriber.start_at(from);

        if from < *next {
            let records = store.read_from(&self.handle, from).await?;
            for record in records.iter().filter(|r| r.sequence < *next) {
                let event = Event::from_record(self.name(), record).map_err(SinkError::from)?;
                subscriber.on_event(Arc::new(event));
            }
            debug!(
                channel = %self.name(),
                from,
                to = *next,
                "Replayed persisted events to new subscriber"
            );
        }

        self.subscribers.register(subscriber);
        Ok(from)
    }
}
