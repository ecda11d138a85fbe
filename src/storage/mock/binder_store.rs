//! Mock BinderStore implementation for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::document::Document;
use crate::storage::{Binder, BinderStore, Result};

/// In-memory binder. Entries are kept in key order.
pub struct MockBinder {
    name: String,
    entries: RwLock<BTreeMap<String, Document>>,
}

impl MockBinder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Binder for MockBinder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, document: &Document) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), document.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Document>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some())
    }

    /// Iterates a copy taken when the stream is created.
    fn iterate(&self) -> BoxStream<'static, Result<(String, Document)>> {
        let snapshot: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        stream::iter(snapshot).boxed()
    }
}

/// Mock binder store that keeps every binder in memory.
#[derive(Default)]
pub struct MockBinderStore {
    binders: RwLock<HashMap<String, Arc<MockBinder>>>,
}

impl MockBinderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BinderStore for MockBinderStore {
    async fn open(&self, name: &str) -> Result<Arc<dyn Binder>> {
        let mut binders = self.binders.write().unwrap_or_else(PoisonError::into_inner);
        let binder = binders
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MockBinder::new(name)))
            .clone();
        Ok(binder as Arc<dyn Binder>)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Binder>> {
        let binders = self.binders.read().unwrap_or_else(PoisonError::into_inner);
        binders.get(name).map(|b| b.clone() as Arc<dyn Binder>)
    }

    async fn binder_names(&self) -> Result<Vec<String>> {
        let binders = self.binders.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = binders.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn close(&self) {}
}
