//! Query registry and execution.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info};

use super::{KeyVal, Query, QueryBuilder, QueryError, Result};
use crate::document::Document;
use crate::storage::BinderStore;

/// Lazy stream of matching entries.
pub type QueryResults = BoxStream<'static, Result<KeyVal>>;

/// Owns the table of registered queries.
pub struct QueryManager {
    binders: Arc<dyn BinderStore>,
    queries: RwLock<BTreeMap<String, Arc<Query>>>,
}

impl QueryManager {
    pub fn new(binders: Arc<dyn BinderStore>) -> Self {
        Self {
            binders,
            queries: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn binders(&self) -> &Arc<dyn BinderStore> {
        &self.binders
    }

    /// Start defining a query.
    pub fn query_builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    pub(crate) fn register(&self, query: Query) -> Result<Arc<Query>> {
        let mut queries = self.queries.write().unwrap_or_else(PoisonError::into_inner);
        if queries.contains_key(&query.name) {
            return Err(QueryError::DuplicateName(query.name));
        }

        let query = Arc::new(query);
        queries.insert(query.name.clone(), Arc::clone(&query));
        info!(query = %query.name, binder = %query.binder_name, "Query registered");
        Ok(query)
    }

    /// Look up a registered query.
    pub fn get(&self, name: &str) -> Option<Arc<Query>> {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Run a query against its binder's current contents.
    ///
    /// Entries are read as the stream is polled; mutations made to the
    /// binder meanwhile may or may not be observed. Each call iterates the
    /// binder from scratch.
    pub fn execute(&self, name: &str, params: Document) -> Result<QueryResults> {
        let query = self
            .get(name)
            .ok_or_else(|| QueryError::NoSuchQuery(name.to_string()))?;
        let binder = query.binder()?;
        debug!(query = %name, binder = %query.binder_name, "Executing query");

        let results = binder
            .iterate()
            .filter_map(move |entry| {
                let item = match entry {
                    Ok(entry) => {
                        let entry = KeyVal::from(entry);
                        query.matches(&params, &entry).then_some(Ok(entry))
                    }
                    Err(e) => Some(Err(QueryError::from(e))),
                };
                future::ready(item)
            })
            .boxed();
        Ok(results)
    }

    /// All registered queries, ordered by name.
    pub fn get_queries(&self) -> Vec<Arc<Query>> {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
