//! Named, reusable filters over binder contents.
//!
//! A query binds a name to a binder and a predicate. Registration happens
//! once, through [`QueryBuilder::create`], and resolves the binder eagerly.
//! Execution iterates the binder's current entries and yields the ones the
//! predicate accepts, lazily, with caller-supplied parameters.

mod builder;
mod manager;

use std::fmt;
use std::sync::{Arc, Weak};

use crate::document::Document;
use crate::storage::{Binder, StorageError};

pub use builder::QueryBuilder;
pub use manager::{QueryManager, QueryResults};

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors from query registration and execution.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    Invalid(String),

    #[error("No such binder: {0}")]
    NoSuchBinder(String),

    #[error("Duplicate query name: {0}")]
    DuplicateName(String),

    #[error("No such query: {0}")]
    NoSuchQuery(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// One binder entry, as seen by predicates and returned from execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub value: Document,
}

impl KeyVal {
    pub fn new(key: impl Into<String>, value: Document) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl From<(String, Document)> for KeyVal {
    fn from((key, value): (String, Document)) -> Self {
        Self { key, value }
    }
}

/// Query predicate: `(parameters, entry) -> keep?`.
pub type Predicate = Arc<dyn Fn(&Document, &KeyVal) -> bool + Send + Sync>;

/// A registered query. Immutable once created.
pub struct Query {
    name: String,
    binder_name: String,
    binder: Weak<dyn Binder>,
    predicate: Predicate,
}

impl Query {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binder_name(&self) -> &str {
        &self.binder_name
    }

    /// Evaluate the predicate against one entry.
    pub fn matches(&self, params: &Document, entry: &KeyVal) -> bool {
        (self.predicate)(params, entry)
    }

    fn binder(&self) -> Result<Arc<dyn Binder>> {
        self.binder
            .upgrade()
            .ok_or_else(|| QueryError::NoSuchBinder(self.binder_name.clone()))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("binder", &self.binder_name)
            .finish_non_exhaustive()
    }
}
