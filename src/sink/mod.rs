//! Event sink: durable, ordered append of events per channel.
//!
//! The sink owns every channel log and its sequence counter. Storage for a
//! channel is provisioned lazily on first append, guarded per channel name
//! so concurrent first appends provision exactly once without serializing
//! unrelated channels. On first touch after process start a channel's
//! counter resumes from the highest persisted sequence number.

mod channel;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::config::DeliveryConfig;
use crate::document::{Document, DocumentError};
use crate::event::{Event, DEFAULT_EVENT_TYPE};
use crate::storage::{ChannelStore, StorageError};
use crate::subscription::{AffinityContext, StartPosition, Subscription, SubscriptionCore};

use channel::ChannelLog;
pub(crate) use channel::SubscriberRegistry;

/// Maximum accepted channel name length in bytes.
pub const MAX_CHANNEL_NAME_LEN: usize = 255;

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur while appending or subscribing.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Invalid channel name '{name}': {reason}")]
    InvalidChannel { name: String, reason: &'static str },

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Append task aborted: {0}")]
    Aborted(String),
}

impl From<StorageError> for SinkError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ChannelNotFound(name) => SinkError::ChannelNotFound(name),
            other => SinkError::Storage(other),
        }
    }
}

/// Check a channel name before it reaches storage.
pub fn validate_channel_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.len() > MAX_CHANNEL_NAME_LEN {
        "too long"
    } else if name.trim().is_empty() {
        "must not be blank"
    } else if name.chars().any(char::is_control) {
        "must not contain control characters"
    } else {
        return Ok(());
    };
    Err(SinkError::InvalidChannel {
        name: name.to_string(),
        reason,
    })
}

/// Owns all channel logs and appends events to them.
pub struct EventSink {
    store: Arc<dyn ChannelStore>,
    channels: Mutex<HashMap<String, Arc<OnceCell<Arc<ChannelLog>>>>>,
}

impl EventSink {
    /// Create a sink over an injected channel store.
    pub fn new(store: Arc<dyn ChannelStore>) -> Self {
        Self {
            store,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ChannelStore> {
        &self.store
    }

    /// Resolve a channel log, provisioning storage if `create` is set.
    ///
    /// The global map lock is only held to find the channel's cell; the
    /// exists/open/create round-trips run under that cell's own guard. A
    /// cell is only kept in the map once it holds a log.
    async fn channel(&self, name: &str, create: bool) -> Result<Arc<ChannelLog>> {
        let existing = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if existing.is_none() && !create && !self.store.exists(name).await? {
            return Err(SinkError::ChannelNotFound(name.to_string()));
        }

        let cell = match existing {
            Some(cell) => cell,
            None => {
                let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(channels.entry(name.to_string()).or_default())
            }
        };

        let result = cell
            .get_or_try_init(|| async {
                let handle = if self.store.exists(name).await? {
                    self.store.open(name).await?
                } else if create {
                    self.store.create(name).await?
                } else {
                    return Err(SinkError::ChannelNotFound(name.to_string()));
                };

                let next_sequence = self
                    .store
                    .max_sequence(&handle)
                    .await?
                    .map_or(0, |max| max + 1);

                info!(channel = %name, next_sequence, "Channel log ready");
                Ok(Arc::new(ChannelLog::new(handle, next_sequence)))
            })
            .await;

        match result {
            Ok(log) => Ok(Arc::clone(log)),
            Err(e) => {
                self.forget_uninitialized(name, &cell);
                Err(e)
            }
        }
    }

    fn forget_uninitialized(&self, name: &str, cell: &Arc<OnceCell<Arc<ChannelLog>>>) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = channels
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            channels.remove(name);
        }
    }

    /// Append and report failures as errors.
    pub async fn try_append(&self, channel: &str, event_type: &str, document: Document) -> Result<u64> {
        validate_channel_name(channel)?;
        let log = self.channel(channel, true).await?;
        let sequence = log.append(self.store.as_ref(), event_type, document).await?;
        debug!(channel = %channel, sequence, "Event appended");
        Ok(sequence)
    }

    /// Append a document with the default event type.
    ///
    /// Returns the assigned sequence number, or `None` if nothing was
    /// assigned. Failures are logged here and never propagated.
    pub async fn append_sync(&self, channel: &str, document: Document) -> Option<u64> {
        self.append_sync_as(channel, DEFAULT_EVENT_TYPE, document).await
    }

    /// Append a document tagged with `event_type`. See [`EventSink::append_sync`].
    #[tracing::instrument(name = "sink.append", skip_all, fields(channel = %channel, event_type = %event_type))]
    pub async fn append_sync_as(
        &self,
        channel: &str,
        event_type: &str,
        document: Document,
    ) -> Option<u64> {
        match self.try_append(channel, event_type, document).await {
            Ok(sequence) => Some(sequence),
            Err(e) => {
                error!(channel = %channel, error = %e, "Failed to append event");
                None
            }
        }
    }

    /// Append on a background task.
    ///
    /// The work starts immediately; the returned future resolves to what
    /// [`EventSink::append_sync`] would have returned.
    pub fn append_async(
        self: &Arc<Self>,
        channel: impl Into<String>,
        document: Document,
    ) -> impl Future<Output = Option<u64>> + Send + 'static {
        let sink = Arc::clone(self);
        let channel = channel.into();
        let task = tokio::spawn(async move { sink.append_sync(&channel, document).await });
        async move {
            match task.await {
                Ok(sequence) => sequence,
                Err(e) => {
                    error!(error = %e, "Append task failed");
                    None
                }
            }
        }
    }

    /// Append on a background task, propagating failures.
    pub fn spawn_append(
        self: &Arc<Self>,
        channel: impl Into<String>,
        event_type: impl Into<String>,
        document: Document,
    ) -> impl Future<Output = Result<u64>> + Send + 'static {
        let sink = Arc::clone(self);
        let channel = channel.into();
        let event_type = event_type.into();
        let task =
            tokio::spawn(async move { sink.try_append(&channel, &event_type, document).await });
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(SinkError::Aborted(e.to_string())),
            }
        }
    }

    /// Read one persisted event back through the storage boundary.
    pub async fn read(&self, channel: &str, sequence: u64) -> Result<Option<Event>> {
        validate_channel_name(channel)?;
        let log = self.channel(channel, false).await?;
        let record = self.store.get(log.handle(), sequence).await?;
        record
            .map(|r| Event::from_record(channel, &r).map_err(SinkError::from))
            .transpose()
    }

    /// Next sequence number the channel will assign.
    pub async fn next_sequence(&self, channel: &str) -> Result<u64> {
        validate_channel_name(channel)?;
        let log = self.channel(channel, false).await?;
        Ok(log.next_sequence().await)
    }

    /// Number of live subscriptions registered on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let cell = {
            let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            channels.get(channel).cloned()
        };
        cell.and_then(|c| c.get().map(|log| log.subscribers().len()))
            .unwrap_or(0)
    }

    /// Subscribe to an existing channel.
    ///
    /// Fails with `ChannelNotFound` if no storage exists for the channel.
    pub async fn subscribe(
        &self,
        channel: &str,
        start: StartPosition,
        context: AffinityContext,
        delivery: &DeliveryConfig,
    ) -> Result<Subscription> {
        validate_channel_name(channel)?;
        let log = self.channel(channel, false).await?;

        let core = Arc::new(SubscriptionCore::new(
            channel,
            context,
            delivery,
            Arc::clone(log.subscribers()),
        ));
        let from = log.attach(self.store.as_ref(), start, &core).await?;

        info!(
            channel = %channel,
            subscription = %core.id(),
            from,
            "Subscription created"
        );
        Ok(Subscription::from_core(core))
    }

    /// Release the underlying storage connection.
    ///
    /// Idempotent and safe without any prior append.
    pub async fn close(&self) {
        self.store.close().await;
        info!("Event sink closed");
    }
}
