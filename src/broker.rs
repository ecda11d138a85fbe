//! In-process broker facade.
//!
//! Wires an event sink, a binder store and a query manager together behind
//! the operations clients use: publish, subscribe, acknowledge, unsubscribe
//! and query. Storage backends are injected; nothing is looked up from
//! process-wide registries.
//!
//! # Example
//!
//! ```ignore
//! use ledgerline::{Broker, Config, Document, StartPosition};
//!
//! let broker = Broker::from_config(&Config::for_test()).await?;
//! broker.publish_sync("orders", Document::new().put("id", 1)).await;
//!
//! let subscription = broker.subscribe("orders", StartPosition::Beginning).await?;
//! subscription.set_handler(|event: ReceivedEvent| {
//!     println!("{} #{}", event.channel(), event.sequence());
//!     event.acknowledge();
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, DeliveryConfig};
use crate::document::Document;
use crate::query::{KeyVal, Query, QueryBuilder, QueryError, QueryManager, QueryResults};
use crate::sink::{EventSink, SinkError};
use crate::storage::{init_storage, Binder, BinderStore, ChannelStore, StorageError};
use crate::subscription::{AffinityContext, StartPosition, Subscription};

/// Entry point for producers and consumers in this process.
///
/// Cheap to clone; clones share storage, channels and registered queries.
#[derive(Clone)]
pub struct Broker {
    sink: Arc<EventSink>,
    binders: Arc<dyn BinderStore>,
    queries: Arc<QueryManager>,
    delivery: DeliveryConfig,
}

impl Broker {
    /// Build a broker over explicitly constructed storage backends.
    pub fn new(
        channels: Arc<dyn ChannelStore>,
        binders: Arc<dyn BinderStore>,
        delivery: DeliveryConfig,
    ) -> Self {
        Self {
            sink: Arc::new(EventSink::new(channels)),
            queries: Arc::new(QueryManager::new(Arc::clone(&binders))),
            binders,
            delivery,
        }
    }

    /// Build a broker with the storage backends named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self, StorageError> {
        let (channels, binders) = init_storage(&config.storage).await?;
        info!(
            storage = ?config.storage.storage_type,
            high_water_bytes = config.delivery.high_water_bytes,
            low_water_bytes = config.delivery.low_water_bytes,
            "Broker initialized"
        );
        Ok(Self::new(channels, binders, config.delivery.clone()))
    }

    pub fn sink(&self) -> &Arc<EventSink> {
        &self.sink
    }

    pub fn delivery(&self) -> &DeliveryConfig {
        &self.delivery
    }

    /// Append and wait for the sequence number. `None` means the append
    /// failed; the failure has already been logged.
    pub async fn publish_sync(&self, channel: &str, document: Document) -> Option<u64> {
        self.sink.append_sync(channel, document).await
    }

    /// Like [`Broker::publish_sync`], tagging the event with `event_type`.
    pub async fn publish_sync_as(
        &self,
        channel: &str,
        event_type: &str,
        document: Document,
    ) -> Option<u64> {
        self.sink.append_sync_as(channel, event_type, document).await
    }

    /// Append in the background. Failures surface as the future's error.
    pub fn publish_async(
        &self,
        channel: impl Into<String>,
        document: Document,
    ) -> impl Future<Output = Result<u64, SinkError>> + Send + 'static {
        self.sink
            .spawn_append(channel, crate::event::DEFAULT_EVENT_TYPE, document)
    }

    /// A publisher bound to one channel.
    pub fn producer(&self, channel: impl Into<String>) -> Producer {
        Producer {
            sink: Arc::clone(&self.sink),
            channel: channel.into(),
        }
    }

    /// Subscribe from `start`.
    ///
    /// The delivery context is chosen when this is called, not when the
    /// returned future is polled: the caller's affinity context if it has
    /// one, otherwise a new dedicated context.
    pub fn subscribe(
        &self,
        channel: &str,
        start: StartPosition,
    ) -> impl Future<Output = Result<Subscription, SinkError>> + Send + 'static {
        let context = AffinityContext::current_or_spawn(format!("subscription:{}", channel));
        let sink = Arc::clone(&self.sink);
        let delivery = self.delivery.clone();
        let channel = channel.to_string();
        async move { sink.subscribe(&channel, start, context, &delivery).await }
    }

    /// Subscribe, delivering on an explicit context.
    pub async fn subscribe_on(
        &self,
        channel: &str,
        start: StartPosition,
        context: AffinityContext,
    ) -> Result<Subscription, SinkError> {
        self.sink
            .subscribe(channel, start, context, &self.delivery)
            .await
    }

    /// Open (creating if needed) a binder.
    pub async fn open_binder(&self, name: &str) -> Result<Arc<dyn Binder>, StorageError> {
        self.binders.open(name).await
    }

    /// Fetch one document from a binder by key.
    pub async fn find_by_id(&self, binder: &str, id: &str) -> Result<Option<Document>, StorageError> {
        let binder = match self.binders.get(binder) {
            Some(binder) => binder,
            None => self.binders.open(binder).await?,
        };
        binder.get(id).await
    }

    pub fn queries(&self) -> &QueryManager {
        &self.queries
    }

    pub fn query_builder(&self) -> QueryBuilder<'_> {
        self.queries.query_builder()
    }

    /// Register a query in one call.
    pub fn register_query<F>(&self, name: &str, binder: &str, predicate: F) -> Result<Arc<Query>, QueryError>
    where
        F: Fn(&Document, &KeyVal) -> bool + Send + Sync + 'static,
    {
        self.queries
            .query_builder()
            .named(name)
            .from(binder)
            .filtered_by(predicate)
            .create()
    }

    pub fn execute_query(&self, name: &str, params: Document) -> Result<QueryResults, QueryError> {
        self.queries.execute(name, params)
    }

    pub fn list_queries(&self) -> Vec<Arc<Query>> {
        self.queries.get_queries()
    }

    /// Release storage. Idempotent.
    pub async fn close(&self) {
        self.sink.close().await;
        self.binders.close().await;
        info!("Broker closed");
    }
}

/// Publishes to a single channel.
#[derive(Clone)]
pub struct Producer {
    sink: Arc<EventSink>,
    channel: String,
}

impl Producer {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn publish_sync(&self, document: Document) -> Option<u64> {
        self.sink.append_sync(&self.channel, document).await
    }

    pub async fn publish_sync_as(&self, event_type: &str, document: Document) -> Option<u64> {
        self.sink.append_sync_as(&self.channel, event_type, document).await
    }

    pub fn publish_async(
        &self,
        document: Document,
    ) -> impl Future<Output = Result<u64, SinkError>> + Send + 'static {
        self.sink
            .spawn_append(self.channel.clone(), crate::event::DEFAULT_EVENT_TYPE, document)
    }
}
