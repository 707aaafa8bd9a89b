//! Error types and result aliases shared by DTM components.
//!
//! Precondition failures against the coordination store (node exists, version
//! mismatch) are not errors; they are reported as results so callers can run
//! their own conflict handling. The variants here cover everything else.

/// The result type used throughout `dtm-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in coordination store and namespace operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The coordination store could not serve the request (connection or
    /// session loss, timeout). The effect of an in-flight mutation is unknown.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A path or node was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input was provided (malformed path, bad identifier, bad config).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true when the store was unreachable and the operation's
    /// effect is indeterminate.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
