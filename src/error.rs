//! Error types for the Kontos library.
//!
//! All recoverable failures are represented by the [`KontosError`] enum.
//! Precondition violations (reference count underflow, inconsistent grow
//! arguments, changes referencing unknown documents) are programming
//! errors and panic instead of returning a variant.

use std::io;

use thiserror::Error;

/// The main error type for Kontos operations.
#[derive(Error, Debug)]
pub enum KontosError {
    /// I/O errors (file operations, flushing, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Dictionary-related errors
    #[error("Dictionary error: {0}")]
    Dictionary(String),

    /// Attribute-related errors
    #[error("Attribute error: {0}")]
    Attribute(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persisted data failed validation (bad magic, version, checksum)
    #[error("Corrupted data: {0}")]
    Corrupted(String),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not valid in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Resource exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with KontosError.
pub type Result<T> = std::result::Result<T, KontosError>;

impl KontosError {
    /// Create a new dictionary error.
    pub fn dictionary<S: Into<String>>(msg: S) -> Self {
        KontosError::Dictionary(msg.into())
    }

    /// Create a new attribute error.
    pub fn attribute<S: Into<String>>(msg: S) -> Self {
        KontosError::Attribute(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        KontosError::Storage(msg.into())
    }

    /// Create a new corrupted-data error.
    pub fn corrupted<S: Into<String>>(msg: S) -> Self {
        KontosError::Corrupted(msg.into())
    }

    /// Create a new invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        KontosError::InvalidArgument(msg.into())
    }

    /// Create a new invalid-operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        KontosError::InvalidOperation(msg.into())
    }

    /// Create a new resource-exhausted error.
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        KontosError::ResourceExhausted(msg.into())
    }

    /// Create a generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        KontosError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KontosError::dictionary("duplicate entry");
        assert_eq!(err.to_string(), "Dictionary error: duplicate entry");

        let err = KontosError::corrupted("bad checksum");
        assert_eq!(err.to_string(), "Corrupted data: bad checksum");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: KontosError = io_err.into();
        assert!(matches!(err, KontosError::Io(_)));
    }
}
