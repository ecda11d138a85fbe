//! Storage interfaces and implementations.
//!
//! This module contains:
//! - `ChannelStore` trait: durable per-channel event logs
//! - `BinderStore` / `Binder` traits: named key/document read models
//! - Implementations: SQLite, Mock (in-memory)

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::document::{Document, DocumentError};

pub mod mock;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::{MockBinderStore, MockChannelStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBinderStore, SqliteChannelStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Binder not found: {0}")]
    BinderNotFound(String),

    #[error("Sequence conflict: channel={channel}, sequence={sequence} already persisted")]
    SequenceConflict { channel: String, sequence: u64 },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Storage is closed")]
    Closed,

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Handle to a provisioned channel log.
///
/// Obtained from [`ChannelStore::open`] or [`ChannelStore::create`] and
/// passed back on every read and write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    name: String,
}

impl ChannelHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One persisted entry of a channel log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub sequence: u64,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    /// Encoded document bytes.
    pub data: Vec<u8>,
}

impl EventRecord {
    pub fn document(&self) -> std::result::Result<Document, DocumentError> {
        Document::decode(&self.data)
    }
}

/// Interface for durable channel logs.
///
/// One logical append-only partition per channel, keyed by sequence number.
///
/// Implementations:
/// - `SqliteChannelStore`: SQLite storage
/// - `MockChannelStore`: In-memory mock for testing
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Whether storage for the channel has been provisioned.
    async fn exists(&self, channel: &str) -> Result<bool>;

    /// Provision storage for a channel.
    ///
    /// Idempotent: creating a channel that already exists returns a handle
    /// to the existing log and leaves its events untouched.
    async fn create(&self, channel: &str) -> Result<ChannelHandle>;

    /// Open an existing channel. Fails with `ChannelNotFound` if missing.
    async fn open(&self, channel: &str) -> Result<ChannelHandle>;

    /// Persist one record. Never overwrites: an occupied sequence fails
    /// with `SequenceConflict`.
    async fn put(&self, handle: &ChannelHandle, record: &EventRecord) -> Result<()>;

    /// Read a single record by sequence number.
    async fn get(&self, handle: &ChannelHandle, sequence: u64) -> Result<Option<EventRecord>>;

    /// Read records with sequence >= `from`, in sequence order.
    async fn read_from(&self, handle: &ChannelHandle, from: u64) -> Result<Vec<EventRecord>>;

    /// Highest persisted sequence number, or `None` for an empty log.
    async fn max_sequence(&self, handle: &ChannelHandle) -> Result<Option<u64>>;

    /// Release the underlying connection.
    ///
    /// Idempotent. Failures are logged by the implementation, not returned.
    async fn close(&self);
}

/// A named key/document map used as a read model.
#[async_trait]
pub trait Binder: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace the document stored under `key`.
    async fn put(&self, key: &str, document: &Document) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Document>>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Lazily iterate all current entries.
    ///
    /// No snapshot isolation: concurrent writes may or may not be observed.
    fn iterate(&self) -> BoxStream<'static, Result<(String, Document)>>;
}

/// Registry of binders.
#[async_trait]
pub trait BinderStore: Send + Sync {
    /// Open a binder, creating it if necessary.
    async fn open(&self, name: &str) -> Result<Arc<dyn Binder>>;

    /// Look up a binder that has already been opened in this process.
    fn get(&self, name: &str) -> Option<Arc<dyn Binder>>;

    /// Names of all binders known to the backend.
    async fn binder_names(&self) -> Result<Vec<String>>;

    async fn close(&self);
}

/// Initialize storage based on configuration.
///
/// Returns the (ChannelStore, BinderStore) pair for the configured backend.
pub async fn init_storage(
    config: &StorageConfig,
) -> Result<(Arc<dyn ChannelStore>, Arc<dyn BinderStore>)> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: in-memory");
            Ok((
                Arc::new(MockChannelStore::new()),
                Arc::new(MockBinderStore::new()),
            ))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let pool = sqlite::connect(&config.sqlite).await?;
            let channels = SqliteChannelStore::new(pool.clone());
            channels.init().await?;
            let binders = SqliteBinderStore::new(pool);
            binders.init().await?;
            Ok((Arc::new(channels), Arc::new(binders)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => Err(StorageError::Backend(
            "SQLite storage requested but 'sqlite' feature is not enabled".to_string(),
        )),
    }
}
