//! RiakLite Core Library
//!
//! Types shared by the RiakLite client crates:
//! - Search query builder and value escaping
//! - Connection configuration
//! - Request and response bodies of the HTTP interface

pub mod config;
pub mod models;
pub mod query;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use models::*;
pub use query::{escape_value, Connector, Query, QueryError, SearchValue, Term};
