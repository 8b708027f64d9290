//! Failure taxonomy for tile rendering.
//!
//! Geometry outcomes (a tile outside the enforced or true extent) are not
//! errors and never appear here; they resolve to a transparent tile.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Typed per-job failure returned to the caller of a tile render.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TileError {
    // === Request Errors ===
    #[error("Unknown raster source: {0}")]
    UnknownSource(String),

    #[error("Invalid tile {coord}: {message}")]
    InvalidTile { coord: String, message: String },

    // === Source Errors ===
    #[error("Raster source '{source_name}' has no georeferencing tags")]
    MissingGeoreference { source_name: String },

    #[error("Raster source '{0}' is disabled after a fatal error")]
    SourceDisabled(String),

    #[error(
        "Raster source '{source_name}' too coarse: coarsest level needs \
         {estimated_pixels} pixels, ceiling is {ceiling}"
    )]
    SourceTooCoarse {
        source_name: String,
        estimated_pixels: u64,
        ceiling: u64,
    },

    #[error("Failed to read raster source '{source_name}': {message}")]
    ReadFailure { source_name: String, message: String },

    // === Job Errors ===
    #[error("Tile render cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TileError {
    /// Create a ReadFailure error.
    pub fn read_failure(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadFailure {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidTile error.
    pub fn invalid_tile(coord: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTile {
            coord: coord.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            TileError::UnknownSource(_) => "unknown_source",
            TileError::InvalidTile { .. } => "invalid_tile",
            TileError::MissingGeoreference { .. } => "missing_georeference",
            TileError::SourceDisabled(_) => "source_disabled",
            TileError::SourceTooCoarse { .. } => "source_too_coarse",
            TileError::ReadFailure { .. } => "read_failure",
            TileError::Cancelled => "cancelled",
            TileError::Internal(_) => "internal",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::InvalidTile { .. } => 400,
            TileError::UnknownSource(_) => 404,
            TileError::SourceTooCoarse { .. } => 422,
            TileError::ReadFailure { .. } => 502,
            TileError::MissingGeoreference { .. } | TileError::SourceDisabled(_) => 503,
            // Client went away; nginx convention.
            TileError::Cancelled => 499,
            TileError::Internal(_) => 500,
        }
    }
}
