//! Mock ChannelStore implementation for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{ChannelHandle, ChannelStore, EventRecord, Result, StorageError};

/// Mock channel store that keeps every log in memory.
#[derive(Default)]
pub struct MockChannelStore {
    channels: RwLock<HashMap<String, BTreeMap<u64, EventRecord>>>,
    fail_on_put: AtomicBool,
    fail_on_create: AtomicBool,
    create_calls: AtomicUsize,
    closed: AtomicBool,
}

impl MockChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_fail_on_put(&self, fail: bool) {
        self.fail_on_put.store(fail, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Number of `create` calls that provisioned a new channel.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate a process restart: persisted logs survive, nothing else does.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn snapshot(&self) -> Self {
        let channels = self.channels.read().await.clone();
        Self {
            channels: RwLock::new(channels),
            ..Self::default()
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for MockChannelStore {
    async fn exists(&self, channel: &str) -> Result<bool> {
        self.check_open()?;
        Ok(self.channels.read().await.contains_key(channel))
    }

    async fn create(&self, channel: &str) -> Result<ChannelHandle> {
        self.check_open()?;
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!(
                "injected create failure for {}",
                channel
            )));
        }
        let mut channels = self.channels.write().await;
        if !channels.contains_key(channel) {
            channels.insert(channel.to_string(), BTreeMap::new());
            self.create_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(ChannelHandle::new(channel))
    }

    async fn open(&self, channel: &str) -> Result<ChannelHandle> {
        if self.exists(channel).await? {
            Ok(ChannelHandle::new(channel))
        } else {
            Err(StorageError::ChannelNotFound(channel.to_string()))
        }
    }

    async fn put(&self, handle: &ChannelHandle, record: &EventRecord) -> Result<()> {
        self.check_open()?;
        if self.fail_on_put.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!(
                "injected put failure for {}",
                handle.name()
            )));
        }
        let mut channels = self.channels.write().await;
        let log = channels
            .get_mut(handle.name())
            .ok_or_else(|| StorageError::ChannelNotFound(handle.name().to_string()))?;
        if log.contains_key(&record.sequence) {
            return Err(StorageError::SequenceConflict {
                channel: handle.name().to_string(),
                sequence: record.sequence,
            });
        }
        log.insert(record.sequence, record.clone());
        Ok(())
    }

    async fn get(&self, handle: &ChannelHandle, sequence: u64) -> Result<Option<EventRecord>> {
        self.check_open()?;
        let channels = self.channels.read().await;
        Ok(channels
            .get(handle.name())
            .and_then(|log| log.get(&sequence))
            .cloned())
    }

    async fn read_from(&self, handle: &ChannelHandle, from: u64) -> Result<Vec<EventRecord>> {
        self.check_open()?;
        let channels = self.channels.read().await;
        Ok(channels
            .get(handle.name())
            .map(|log| log.range(from..).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn max_sequence(&self, handle: &ChannelHandle) -> Result<Option<u64>> {
        self.check_open()?;
        let channels = self.channels.read().await;
        Ok(channels
            .get(handle.name())
            .and_then(|log| log.keys().next_back().copied()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
