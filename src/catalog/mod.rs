//! Catalog module: the tool records the search engine serves.
//!
//! Records are read once from the external SQLite catalog and held in memory
//! as an ordered corpus. Everything downstream indexes into that order.

pub mod loader;
pub mod types;

pub use loader::SqliteCatalog;
pub use types::{ScoredResult, ToolRecord};
