use async_trait::async_trait;
use serde_json::Value;

/// A document fetched from a collection, with its store-assigned id.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Comparison operators supported by [`DocumentStore::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A single field write inside a document update.
///
/// `Increment` and `ServerTimestamp` are resolved by the store itself, so a
/// read-modify-write on the caller's side is never needed for counters.
#[derive(Debug, Clone)]
pub enum FieldOp {
    Set(Value),
    Increment(f64),
    ServerTimestamp,
    Delete,
}

/// Update entry inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub collection: String,
    pub id: String,
    pub fields: Vec<(String, FieldOp)>,
}

/// A set of document updates committed atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub entries: Vec<BatchEntry>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Vec<(String, FieldOp)>,
    ) -> &mut Self {
        self.entries.push(BatchEntry {
            collection: collection.into(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Contract for the external document database.
///
/// Per-document updates are atomic. Batches commit all-or-nothing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    async fn query(
        &self,
        collection: &str,
        field: &str,
        op: QueryOp,
        value: Value,
    ) -> Result<Vec<Document>, StoreError>;

    /// Insert a document and return its generated id.
    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    /// Merge `fields` into an existing document as one atomic write.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Vec<(String, FieldOp)>,
    ) -> Result<(), StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
