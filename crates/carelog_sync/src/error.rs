//! Error types for the sync engine.

use carelog_protocol::RecordKey;
use carelog_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or transport failure; the batch or page was left untouched.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether a later attempt may succeed.
        retryable: bool,
    },

    /// A network call exceeded its caller-supplied timeout.
    #[error("operation timed out")]
    Timeout,

    /// The remote endpoint refused the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The sink rejected an individual entry; it stays in the local log.
    #[error("change rejected for {key}: {reason}")]
    Rejected {
        /// The entry that was rejected.
        key: RecordKey,
        /// Server-provided reason.
        reason: String,
    },

    /// Local persistence failure; fatal to the run, never swallowed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Malformed message or a violated engine invariant.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The run was cancelled cooperatively.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable network error.
    pub fn network_retryable(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable network error.
    pub fn network_fatal(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later sync attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }

    /// Returns true if this error must abort the whole run.
    ///
    /// Per-entry rejections aggregate into the outcome instead; everything
    /// else short-circuits.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::network_retryable("connection reset").is_retryable());
        assert!(!SyncError::network_fatal("bad certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Authentication("expired".into()).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(SyncError::Cancelled.is_fatal());
        assert!(SyncError::Timeout.is_fatal());
        assert!(!SyncError::Rejected {
            key: RecordKey::new("Patient", "p1"),
            reason: "invalid".into(),
        }
        .is_fatal());
    }

    #[test]
    fn storage_errors_convert() {
        let err: SyncError = StoreError::RecordNotFound {
            key: RecordKey::new("Patient", "p1"),
        }
        .into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(err.is_fatal());
    }
}
