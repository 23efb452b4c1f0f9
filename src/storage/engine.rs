use crate::core::{Document, FindOptions, Query, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Fully qualified collection address inside one store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Result of an id-keyed `$set` update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: usize,
    pub modified: usize,
    pub upserted: bool,
}

impl UpdateResult {
    /// Documents the update touched, counting an upsert as one.
    pub fn affected(&self) -> usize {
        if self.upserted { 1 } else { self.matched }
    }
}

/// Raw document store operations the batching layer builds on.
///
/// Implementations talk to the physical store; they are shared between every
/// client addressing the same endpoint and must be safe to call concurrently.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Unordered bulk insert. On partial failure (for example duplicate
    /// `_id`s) the remaining documents are still inserted and the error is
    /// reported as [`DocError::BulkWrite`](crate::core::DocError::BulkWrite)
    /// carrying the number written.
    async fn insert_many(&self, ns: &Namespace, docs: Vec<Document>) -> Result<usize>;

    async fn find(&self, ns: &Namespace, query: &Query, options: &FindOptions)
    -> Result<Vec<Document>>;

    /// Applies `$set` to the document with the given `_id`.
    async fn find_one_and_update(
        &self,
        ns: &Namespace,
        id: &str,
        set: Map<String, Value>,
        upsert: bool,
    ) -> Result<UpdateResult>;

    async fn count_documents(&self, ns: &Namespace, query: &Query) -> Result<usize>;

    /// Returns `false` when the collection did not exist.
    async fn drop_collection(&self, ns: &Namespace) -> Result<bool>;

    async fn close(&self) -> Result<()>;
}

/// Establishes physical connections for an endpoint URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn DocumentStore>>;
}
