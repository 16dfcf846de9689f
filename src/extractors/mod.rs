//! Request extractors shared by the table handlers.

pub mod principal;
