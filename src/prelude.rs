//! Common imports for application code.
//!
//! `use docbatch::prelude::*;` brings in the client, its configuration and
//! the types its operations take and return.

pub use crate::connection::config::ClientConfig;
pub use crate::connection::registry::ConnectionRegistry;
pub use crate::copy::{BulkCopyOptions, BulkCopySummary};
pub use crate::core::{DocError, Document, Query, Result};
pub use crate::facade::Client;
pub use crate::queue::{BatchWriter, DrainSummary, QueueOptions, WriteReport};
pub use crate::scan::FindManyIn;
pub use crate::doc;
