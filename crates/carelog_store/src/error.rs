//! Error types for the local store.

use carelog_protocol::RecordKey;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the given key.
    #[error("record not found: {key}")]
    RecordNotFound {
        /// The key that was looked up.
        key: RecordKey,
    },

    /// A record with the given key already exists.
    #[error("record already exists: {key}")]
    DuplicateRecord {
        /// The key that collided.
        key: RecordKey,
    },

    /// The record has uncommitted local changes; sync or force-purge first.
    #[error("record has pending local changes: {key}")]
    PendingChanges {
        /// The key with pending changes.
        key: RecordKey,
    },

    /// I/O error while persisting or loading a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_key() {
        let err = StoreError::RecordNotFound {
            key: RecordKey::new("Patient", "p1"),
        };
        assert_eq!(err.to_string(), "record not found: Patient/p1");
    }
}
