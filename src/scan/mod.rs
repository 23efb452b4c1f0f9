//! Id enumeration and mapped reads over a collection.

pub mod reader;

pub use reader::{FindManyIn, all_ids, filter, find_many_in, map, projection_for};
