//! Document-oriented record store adapter.
//!
//! Records are JSON objects grouped into named collections. Writers address
//! nested fields with dotted paths (`documents.government_id.review`), append to
//! arrays without rewriting them, and let the store stamp timestamps.

mod blob;
mod memory;

use std::cmp::Ordering;
use std::future::Future;

use serde_json::{Map, Value};

pub use blob::{verify_signature, BlobError, BlobStore, LocalBlobStore};
pub use memory::MemoryRecordStore;

pub type Document = Map<String, Value>;

pub const ENROLLMENTS: &str = "enrollments";
pub const BATCHES: &str = "course_batches";
pub const USERS: &str = "student_users";
pub const STAFF: &str = "staff";
pub const OTP_CODES: &str = "otp_codes";
pub const INSTRUCTOR_APPLICATIONS: &str = "instructor_applications";

/// Single mutation applied by [`RecordStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set { path: String, value: Value },
    Delete { path: String },
    /// Appends each value that is not already present in the array.
    ArrayUnion { path: String, values: Vec<Value> },
    ServerTimestamp { path: String },
}

impl FieldUpdate {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self::Set {
            path: path.into(),
            value,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }

    pub fn append(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::ArrayUnion {
            path: path.into(),
            values,
        }
    }

    pub fn server_timestamp(path: impl Into<String>) -> Self {
        Self::ServerTimestamp { path: path.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub(crate) fn matches(&self, document: &Document) -> bool {
        let Some(found) = lookup(document, &self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => found == &self.value,
            FilterOp::Gte => matches!(
                compare(found, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lte => matches!(
                compare(found, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertionOrder {
    #[default]
    Oldest,
    Newest,
}

/// Simple filtered scan over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order: InsertionOrder,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order: InsertionOrder::default(),
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Gte,
            value: value.into(),
        });
        self
    }

    pub fn where_lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Lte,
            value: value.into(),
        });
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = InsertionOrder::Newest;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

/// Storage abstraction so workflows can be exercised without a database.
pub trait RecordStore: Send + Sync + 'static {
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Create or fully replace a document.
    fn set(
        &self,
        collection: &str,
        id: &str,
        data: Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Apply field updates to an existing document in order.
    fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete(&self, collection: &str, id: &str)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    fn query(&self, query: Query)
        -> impl Future<Output = Result<Vec<StoredDocument>, StoreError>> + Send;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("field path '{0}' does not address an object")]
    InvalidPath(String),
    #[error("field '{0}' is not an array")]
    NotAnArray(String),
    #[error("record could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Serialize a typed record into a store document.
pub fn to_document<T: serde::Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Unavailable(format!(
            "expected an object document, found {other}"
        ))),
    }
}

pub fn from_document<T: serde::de::DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}
