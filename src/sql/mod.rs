//! Safe SQL builder: identifiers from the reflected catalog only, values as parameters.

mod builder;
pub mod params;
pub mod spec;
pub use builder::*;
pub use params::*;
pub use spec::{parse_key, FilterClause, FilterOp, FilterTarget, KeyTuple, PageLimits, QuerySpec, SortDirection};
