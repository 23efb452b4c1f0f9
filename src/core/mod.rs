pub mod document;
pub mod error;
pub mod query;

pub use document::{Document, ID_FIELD, generate_id, id_to_string, normalize_ids};
pub use error::{DocError, Result};
pub use query::{Condition, FindOptions, Projection, Query};
