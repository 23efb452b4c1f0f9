//! Collection-to-collection bulk copy.

pub mod pipeline;

pub use pipeline::{BulkCopyOptions, BulkCopyPipeline, BulkCopySummary};
