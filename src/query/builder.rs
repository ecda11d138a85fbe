//! Fluent builder for registering queries.

use std::sync::Arc;

use super::{KeyVal, Predicate, Query, QueryError, QueryManager, Result};
use crate::document::Document;

/// Accumulates a query definition; setters may be called in any order.
pub struct QueryBuilder<'a> {
    manager: &'a QueryManager,
    name: Option<String>,
    binder: Option<String>,
    predicate: Option<Predicate>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(manager: &'a QueryManager) -> Self {
        Self {
            manager,
            name: None,
            binder: None,
            predicate: None,
        }
    }

    /// Set the unique query name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the binder the query reads.
    pub fn from(mut self, binder: impl Into<String>) -> Self {
        self.binder = Some(binder.into());
        self
    }

    /// Set the predicate applied to each entry at execution time.
    pub fn filtered_by<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Document, &KeyVal) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Validate and register the query.
    ///
    /// The binder must already be open; it is resolved now, not at
    /// execution time.
    pub fn create(self) -> Result<Arc<Query>> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| QueryError::Invalid("query name not set".to_string()))?;
        let binder_name = self
            .binder
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| QueryError::Invalid(format!("binder not set for query '{}'", name)))?;
        let predicate = self
            .predicate
            .ok_or_else(|| QueryError::Invalid(format!("predicate not set for query '{}'", name)))?;

        let binder = self
            .manager
            .binders()
            .get(&binder_name)
            .ok_or_else(|| QueryError::NoSuchBinder(binder_name.clone()))?;

        let query = Query {
            name,
            binder_name,
            binder: Arc::downgrade(&binder),
            predicate,
        };
        self.manager.register(query)
    }
}
