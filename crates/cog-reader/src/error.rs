//! Error types for COG access.

use thiserror::Error;

/// Errors that can occur while opening or reading a tiled raster.
#[derive(Error, Debug)]
pub enum CogError {
    /// The byte-range transport failed.
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// The file is not a TIFF, or its structure is inconsistent.
    #[error("invalid TIFF: {0}")]
    InvalidTiff(String),

    /// The file has no ModelPixelScale/ModelTiepoint or ModelTransformation.
    #[error("no georeferencing tags in {0}")]
    MissingGeoreference(String),

    /// A valid TIFF feature this reader does not implement.
    #[error("unsupported TIFF feature: {0}")]
    Unsupported(String),

    /// A tile could not be decompressed.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// The requested level or window is not usable.
    #[error("invalid read request: {0}")]
    InvalidRequest(String),

    /// A capped read would touch more internal tiles than allowed.
    #[error("window touches {touched} tiles, limit is {limit}")]
    TileLimit { touched: usize, limit: usize },
}

impl CogError {
    /// Create an InvalidTiff error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidTiff(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a Decompression error.
    pub fn decompression(msg: impl Into<String>) -> Self {
        Self::Decompression(msg.into())
    }

    /// True when the failure is a property of the file, not of the read.
    pub fn is_fatal_for_source(&self) -> bool {
        matches!(self, CogError::MissingGeoreference(_))
    }

    /// True when repeating the same read may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CogError::Storage(_))
    }
}

impl From<std::io::Error> for CogError {
    fn from(err: std::io::Error) -> Self {
        Self::Decompression(err.to_string())
    }
}

/// Result type for COG operations.
pub type Result<T> = std::result::Result<T, CogError>;
