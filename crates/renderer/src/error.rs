//! Error types for styling and encoding.

use thiserror::Error;

/// Errors raised while building color maps or encoding images.
#[derive(Error, Debug)]
pub enum StyleError {
    #[error("invalid color '{0}'")]
    InvalidColor(String),

    #[error("color ramp has no stops")]
    EmptyRamp,

    #[error("color ramp stop {index} has non-finite value {value}")]
    NonFiniteStop { index: usize, value: f64 },

    #[error("color ramp stops not ascending at index {index}: {previous} > {value}")]
    UnsortedStops {
        index: usize,
        previous: f64,
        value: f64,
    },

    #[error("legend parse error: {0}")]
    Legend(#[from] serde_json::Error),

    #[error("image encoding failed: {0}")]
    Encode(String),
}

impl StyleError {
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

/// Result type for renderer operations.
pub type Result<T> = std::result::Result<T, StyleError>;
