//! Batched, queued writes into one collection.

pub mod options;
pub mod outcome;
pub mod writer;

pub use options::{QueueOptions, WriteMode};
pub use outcome::{DrainSummary, WriteOutcome, WriteReport};
pub use writer::{BatchWriter, DrainCallback};

pub(crate) use writer::{insert_batch, into_chunks};
