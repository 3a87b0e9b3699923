//! Error types for OmniPDS core operations.
//!
//! Errors are descriptive at the core level; callers (CLI, agent bridge)
//! map them to user-facing messages. Nothing in this crate panics on a
//! fallible operation.

use thiserror::Error;

/// Result type alias for OmniPDS operations.
pub type Result<T> = std::result::Result<T, PdsError>;

/// Core error type for OmniPDS operations.
#[derive(Debug, Error)]
pub enum PdsError {
    /// Malformed SQL or constraint violation at the statement boundary
    #[error("Query error: {0}")]
    Query(String),

    /// Snapshot sink or filesystem error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Network failure talking to the remote snapshot store
    #[error("Transport error: {0}")]
    Transport(String),

    /// Search index maintenance error
    #[error("Index error: {0}")]
    Index(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error (fallback)
    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for PdsError {
    fn from(err: rusqlite::Error) -> Self {
        PdsError::Query(err.to_string())
    }
}

impl From<std::io::Error> for PdsError {
    fn from(err: std::io::Error) -> Self {
        PdsError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PdsError {
    fn from(err: serde_json::Error) -> Self {
        PdsError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for PdsError {
    fn from(err: reqwest::Error) -> Self {
        PdsError::Transport(err.to_string())
    }
}
