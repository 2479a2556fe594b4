//! Storage error types and result alias.
//!
//! All pending-signup store implementations map their internal failures to
//! [`StorageError`]. Absence of a record is not an error: lookups return
//! `Ok(None)` and deletes are idempotent.
//!
//! # Example
//!
//! ```
//! use easyprep_storage::{StorageError, StorageResult};
//!
//! fn lookup(id: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(id))
//! }
//!
//! assert!(lookup("abc").is_err());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested record or account was not found.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// A uniqueness or compare-and-swap precondition failed.
    #[error("Conflict: {message}")]
    Conflict {
        /// Which precondition failed.
        message: String,
    },

    /// Backend-specific internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation exceeded its time limit.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::not_found("abc").to_string(), "Key not found: abc");
        assert_eq!(
            StorageError::conflict("identifier taken").to_string(),
            "Conflict: identifier taken"
        );
        assert_eq!(StorageError::internal("boom").to_string(), "Internal error: boom");
        assert_eq!(StorageError::timeout().to_string(), "Operation timeout");
    }

    #[test]
    fn test_internal_with_source_preserves_chain() {
        let err = StorageError::internal_with_source("wrapped", StorageError::Timeout);
        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "Operation timeout");
    }

    #[test]
    fn test_only_timeout_is_transient() {
        assert!(StorageError::timeout().is_transient());
        assert!(!StorageError::not_found("x").is_transient());
        assert!(!StorageError::conflict("x").is_transient());
        assert!(!StorageError::internal("x").is_transient());
    }
}
