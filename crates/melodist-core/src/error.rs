//! Error types for request handling and canonicalization.

use thiserror::Error;

/// Top-level error type for core operations.
///
/// Note-level problems never surface here: malformed notes are dropped or
/// repaired by the validator. These errors cover whole documents that cannot
/// be read at all.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Canonicalization error.
    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
