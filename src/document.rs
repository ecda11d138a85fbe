//! Structured documents.
//!
//! A `Document` is the payload of every event and the value of every binder
//! entry. It is a map of named fields to JSON-like values; nested objects
//! and arrays are allowed. The broker never looks inside a document except
//! through caller-supplied query filters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Errors that can occur while building or decoding documents.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Document must be an object, got {0}")]
    NotAnObject(&'static str),

    #[error("Document codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// An ordered map of field names to values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, returning the document for chaining.
    pub fn put(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set a field in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    /// Get a nested document.
    ///
    /// Returns `None` if the field is missing or is not an object.
    pub fn get_document(&self, key: &str) -> Option<Document> {
        match self.fields.get(key) {
            Some(Value::Object(map)) => Some(Document { fields: map.clone() }),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fields)?)
    }

    /// Deserialize from bytes produced by [`Document::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::try_from(value)
    }

    /// Approximate encoded size in bytes, used for flow-control accounting.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.fields)
            .map(|bytes| bytes.len())
            .unwrap_or(0)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Err(DocumentError::NotAnObject("null")),
            Value::Bool(_) => Err(DocumentError::NotAnObject("bool")),
            Value::Number(_) => Err(DocumentError::NotAnObject("number")),
            Value::String(_) => Err(DocumentError::NotAnObject("string")),
            Value::Array(_) => Err(DocumentError::NotAnObject("array")),
        }
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}
