//! QueryEngine: generic CRUD over reflected tables, plus the request validator.

mod crud;
mod validation;
pub use crud::{QueryEngine, Record};
pub use validation::{is_iso8601, RequestValidator};
