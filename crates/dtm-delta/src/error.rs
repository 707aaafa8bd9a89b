//! Error types for `dtm-delta`.
//!
//! Every failure names the condition that was violated so the calling layer
//! can decide whether to retry the statement, report a user error, or
//! escalate. Only [`DeltaError::StoreUnavailable`] and
//! [`DeltaError::Conflict`] are worth retrying.

/// Result type for delta operations.
pub type Result<T> = std::result::Result<T, DeltaError>;

/// Delta coordination errors.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    /// A hot delta is already open, so the previous one is not committed yet.
    #[error("delta is not committed: hot delta {delta_num} is already open in datamart {datamart}")]
    AlreadyOpen {
        /// Datamart name.
        datamart: String,
        /// Number of the open hot delta.
        delta_num: i64,
    },

    /// The operation required a committed delta that is not committed yet.
    #[error("delta is not committed: {message}")]
    NotCommitted {
        /// Human-readable details.
        message: String,
    },

    /// Promotion was attempted while write operations are still in progress.
    #[error("delta not finished: datamart {datamart} has write operations in progress {pending:?}")]
    NotFinished {
        /// Datamart name.
        datamart: String,
        /// `sysCn` values of the unresolved write operations.
        pending: Vec<i64>,
    },

    /// The table already has an unresolved write operation in the hot delta.
    #[error("table blocked: {datamart}.{table} has write operation {sys_cn} in progress")]
    TableBlocked {
        /// Datamart name.
        datamart: String,
        /// Table name.
        table: String,
        /// `sysCn` of the blocking operation.
        sys_cn: i64,
    },

    /// The hot delta has been marked as failed and only accepts abort paths.
    #[error("delta rolling back: hot delta {delta_num} in datamart {datamart} is marked as failed")]
    RollingBack {
        /// Datamart name.
        datamart: String,
        /// Number of the failed hot delta.
        delta_num: i64,
    },

    /// The requested hot delta, ok delta, or write operation does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable not-found details.
        message: String,
    },

    /// The datamart root node is missing.
    #[error("datamart not found: {datamart}")]
    NamespaceNotFound {
        /// Datamart name.
        datamart: String,
    },

    /// Concurrent writers kept winning the version check.
    #[error("conflict: {message}")]
    Conflict {
        /// Human-readable conflict details.
        message: String,
    },

    /// Invalid input from a caller.
    #[error("bad request: {message}")]
    BadRequest {
        /// Human-readable error details.
        message: String,
    },

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable serialization details.
        message: String,
    },

    /// The coordination store failed; the mutation's effect is unknown.
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(#[from] dtm_core::Error),
}

impl DeltaError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub(crate) fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns a stable snake-case name for the condition, used in logs and
    /// metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyOpen { .. } => "delta_already_open",
            Self::NotCommitted { .. } => "delta_not_committed",
            Self::NotFinished { .. } => "delta_not_finished",
            Self::TableBlocked { .. } => "table_blocked",
            Self::RollingBack { .. } => "delta_rolling_back",
            Self::NotFound { .. } => "not_found",
            Self::NamespaceNotFound { .. } => "datamart_not_found",
            Self::Conflict { .. } => "conflict",
            Self::BadRequest { .. } => "bad_request",
            Self::Serialization { .. } => "serialization",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Returns true if re-issuing the whole request may succeed.
    ///
    /// After `StoreUnavailable` the caller should re-read state first: the
    /// failed mutation may or may not have been applied.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_violated_condition() {
        let err = DeltaError::TableBlocked {
            datamart: "dtm".into(),
            table: "tbl1".into(),
            sys_cn: 3,
        };
        assert!(err.to_string().starts_with("table blocked"));
        assert_eq!(err.kind(), "table_blocked");

        let err = DeltaError::NotFinished {
            datamart: "dtm".into(),
            pending: vec![7],
        };
        assert!(err.to_string().starts_with("delta not finished"));

        let err = DeltaError::AlreadyOpen {
            datamart: "dtm".into(),
            delta_num: 0,
        };
        assert!(err.to_string().starts_with("delta is not committed"));
    }

    #[test]
    fn test_only_store_failures_and_conflicts_are_retryable() {
        assert!(DeltaError::from(dtm_core::Error::storage("session expired")).is_retryable());
        assert!(DeltaError::conflict("lost race").is_retryable());
        assert!(!DeltaError::not_found("hot delta").is_retryable());
        assert!(
            !DeltaError::NamespaceNotFound {
                datamart: "x".into()
            }
            .is_retryable()
        );
    }
}
