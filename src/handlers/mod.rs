//! HTTP handlers for generated table routes and static meta endpoints.

pub mod meta;
pub mod table;
pub use table::{not_allowed, Operations, TableMeta};
