pub mod engine;
pub mod memory;

pub use engine::{Connector, DocumentStore, Namespace, UpdateResult};
pub use memory::{MemoryConnector, MemoryServer, MemoryStore, StoreStats};
