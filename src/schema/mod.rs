//! Reflected schema: descriptors, catalog reflection and the per-table lookup table.

pub mod catalog;
pub mod reflect;
pub mod types;

pub use catalog::{path_segment, Catalog, TableEntry};
pub use reflect::reflect;
pub use types::*;
