// ============================================================================
// docbatch Library
// ============================================================================

pub mod core;
pub mod storage;
pub mod connection;
pub mod queue;
pub mod scan;
pub mod copy;
pub mod facade;
pub mod prelude;

// Re-export main types for convenience
pub use crate::core::{DocError, Document, FindOptions, Projection, Query, Result, generate_id};
pub use facade::Client;

// Re-export connection API
pub use connection::{
    Collection,
    ConnectionHandle,
    auth::Credentials,
    config::{ClientConfig, ResolvedEndpoint},
    registry::{ConnectionRegistry, RegistryStats},
};

// Re-export the write queue, reads and bulk copy
pub use queue::{BatchWriter, DrainSummary, QueueOptions, WriteMode, WriteOutcome, WriteReport};
pub use scan::FindManyIn;
pub use copy::{BulkCopyOptions, BulkCopyPipeline, BulkCopySummary};

// Store backends
pub use storage::{Connector, DocumentStore, MemoryConnector, MemoryServer, MemoryStore, Namespace};
