pub mod auth;
pub mod config;
pub mod registry;

use crate::core::{Document, FindOptions, Query, Result};
use crate::storage::{DocumentStore, Namespace, UpdateResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

pub use config::{database_name, redact_url};

/// Live connection to one resolved endpoint
///
/// Cheap to clone; every clone shares the same physical connection. Clients
/// with different collection prefixes on the same endpoint share one handle.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// Unique handle ID
    id: Uuid,
    /// Endpoint URL this handle was established for
    endpoint: String,
    /// Database named by the endpoint URL
    database: String,
    store: Arc<dyn DocumentStore>,
}

impl ConnectionHandle {
    pub(crate) fn new(endpoint: &str, store: Arc<dyn DocumentStore>) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            endpoint: endpoint.to_string(),
            database: database_name(endpoint)?,
            store,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Whether both handles refer to the same physical connection.
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.id == other.id
    }

    /// Handle on a fully named collection (no prefix applied here).
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            handle: self.clone(),
            ns: Namespace::new(self.database.clone(), name),
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("endpoint", &redact_url(&self.endpoint))
            .field("database", &self.database)
            .finish()
    }
}

/// A collection on a live connection.
#[derive(Clone, Debug)]
pub struct Collection {
    handle: ConnectionHandle,
    ns: Namespace,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.ns.collection
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Same endpoint, database and collection name.
    pub fn same_as(&self, other: &Collection) -> bool {
        self.handle.endpoint == other.handle.endpoint && self.ns == other.ns
    }

    pub async fn insert_many(&self, docs: Vec<Document>) -> Result<usize> {
        self.handle.store.insert_many(&self.ns, docs).await
    }

    pub async fn find(&self, query: &Query, options: &FindOptions) -> Result<Vec<Document>> {
        self.handle.store.find(&self.ns, query, options).await
    }

    pub async fn find_one_and_update(
        &self,
        id: &str,
        set: Map<String, Value>,
        upsert: bool,
    ) -> Result<UpdateResult> {
        self.handle
            .store
            .find_one_and_update(&self.ns, id, set, upsert)
            .await
    }

    pub async fn count_documents(&self, query: &Query) -> Result<usize> {
        self.handle.store.count_documents(&self.ns, query).await
    }

    pub async fn drop_collection(&self) -> Result<bool> {
        self.handle.store.drop_collection(&self.ns).await
    }
}
