//! Error types for raster archive transport.

use thiserror::Error;

/// Result type alias using StorageError.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while resolving or reading a raster archive.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The source URL could not be mapped to a store.
    #[error("invalid source location '{0}'")]
    InvalidLocation(String),

    /// The store client could not be constructed.
    #[error("failed to create store for '{location}': {message}")]
    ClientFailed { location: String, message: String },

    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A range request failed.
    #[error("failed to read range {start}..{end} of '{location}': {message}")]
    RangeFailed {
        location: String,
        start: u64,
        end: u64,
        message: String,
    },

    /// Any other transport error.
    #[error("storage error: {0}")]
    Transport(String),
}

impl StorageError {
    /// Create a RangeFailed error.
    pub fn range_failed(
        location: impl Into<String>,
        range: &std::ops::Range<u64>,
        message: impl Into<String>,
    ) -> Self {
        Self::RangeFailed {
            location: location.into(),
            start: range.start,
            end: range.end,
            message: message.into(),
        }
    }

    /// Create a ClientFailed error.
    pub fn client_failed(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClientFailed {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::Transport(other.to_string()),
        }
    }
}
