//! RiakLite Client Library
//!
//! HTTP client for Riak KV: key/value objects, counters, binary objects,
//! search queries and search index/schema management.

mod client;
mod files;

use std::path::PathBuf;

pub use client::Client;
pub use riaklite_core::models::{Counter, SearchResults, MAX_FILE_BYTESIZE};
pub use riaklite_core::query::{escape_value, Query, QueryError};
pub use riaklite_core::{Config, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("cannot read file: {}", path.display())]
    FileUnreadable { path: PathBuf },

    #[error("file size {size} of {} exceeds allowed maximum: {max}", path.display())]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("empty key")]
    EmptyKey,

    #[error("path is not writable: {}", dir.display())]
    NotWritable { dir: PathBuf },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("can not create counter {bucket}/{key}: {reason}")]
    CounterCreation {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Caller misuse detected before anything was sent
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::Query(_)
                | ClientError::FileUnreadable { .. }
                | ClientError::FileTooLarge { .. }
                | ClientError::EmptyKey
                | ClientError::NotWritable { .. }
        )
    }

    pub fn is_config(&self) -> bool {
        matches!(self, ClientError::Config(_) | ClientError::Tls(_))
    }

    /// Store or network condition
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ClientError::Request(_) | ClientError::Server { .. } | ClientError::CounterCreation { .. }
        )
    }

    /// HTTP status reported by the store, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            ClientError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
