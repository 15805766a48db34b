//! Error types for ngcf.

use thiserror::Error;

/// Ngcf error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Two related inputs disagree on a dimension (adjacency size vs. node
    /// count, batch slices of unequal length, dropout list vs. layer list).
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    /// A batch index fell outside its valid range.
    #[error("{kind} index {index} out of range (bound {bound})")]
    IndexOutOfRange {
        index: usize,
        bound: usize,
        kind: &'static str,
    },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
