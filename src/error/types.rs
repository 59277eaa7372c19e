//! Error types
//!
//! Defines domain-specific error types for each module of the server.

use std::io;

use thiserror::Error;

/// Path resolution errors
#[derive(Debug, Error)]
pub enum PathError {
    #[error("Path traversal attempt: {0}")]
    Traversal(String),
    #[error("Malformed path: {0}")]
    Malformed(String),
    #[error("Cannot canonicalize {path}: {source}")]
    Canonicalize {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// File operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    InvalidPath(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{context}: {source}")]
    OperationFailed {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("Stats store error: {0}")]
    Stats(#[from] StatsError),
}

impl StorageError {
    pub fn failed(context: impl Into<String>, source: io::Error) -> Self {
        StorageError::OperationFailed {
            context: context.into(),
            source,
        }
    }
}

impl From<PathError> for StorageError {
    fn from(error: PathError) -> Self {
        StorageError::InvalidPath(format!("Invalid path: {error}"))
    }
}

/// Stats store errors
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Server stats row is missing")]
    MissingRow,
    #[error("Stats store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Stats store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Startup errors for the server binary
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Shared directory {path} is not usable: {source}")]
    SharedDir {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("No available port among {0:?}")]
    NoAvailablePort(Vec<u16>),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
