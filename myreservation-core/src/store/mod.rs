//! Document store seam.
//!
//! Records are schema-flexible maps of [`Value`]s grouped in named
//! collections. A store can add and delete records and push full result sets
//! of a [`Query`] through a [`Subscription`] whenever matching data changes.

mod subscription;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use subscription::{SnapshotResult, Subscription};

/// A field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    /// Placeholder resolved to the store's clock when the write is applied.
    ServerTimestamp,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Field name to value.
pub type Fields = BTreeMap<String, Value>;

/// A stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Identifier assigned by the store.
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}

/// Equality filter on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// A record without the field never matches, not even a null filter.
    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field).is_some_and(|v| *v == self.value)
    }
}

/// Records of one collection matching all filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(field, value));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Returns the value this query pins `field` to, if any.
    pub fn pinned(&self, field: &str) -> Option<&Value> {
        self.filters
            .iter()
            .find(|f| f.field == field)
            .map(|f| &f.value)
    }
}

/// Full current result set of a live query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

/// Outcome of a successful add.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// Identifier of the new record.
    pub id: String,
    /// Store clock at which the write was applied.
    pub server_time: DateTime<Utc>,
}

/// Errors raised by a document store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Missing or insufficient permissions.")]
    PermissionDenied,
    #[error("The request does not have valid authentication credentials.")]
    Unauthenticated,
    #[error("Request failed: {0}")]
    Transport(String),
    /// Error reported by the backend; displays the backend's message.
    #[error("{message}")]
    Backend { status: String, message: String },
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Generates a 20-character alphanumeric record id.
pub fn auto_id() -> String {
    use rand::Rng;

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..20)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// An external service persisting records and serving live queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Adds a record with a store-assigned id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<WriteResult, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Opens a live query. The first snapshot carries the current result set.
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;
}
