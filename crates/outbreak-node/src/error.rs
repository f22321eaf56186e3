//! Error types for the node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] outbreak_engine::Error),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<Error> for outbreak_engine::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Engine(inner) => inner,
            other => outbreak_engine::Error::Persistence(other.to_string()),
        }
    }
}
