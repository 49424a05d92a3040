//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The remote store could not be reached or the connection was lost.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The remote store answered with an error reply.
    #[error("command {command} failed: {message}")]
    Command {
        /// Name of the command that failed.
        command: String,
        /// Error text returned by the store.
        message: String,
    },

    /// The remote store answered with a reply of the wrong type.
    #[error("unexpected reply to {command}: expected {expected}, got {actual}")]
    UnexpectedReply {
        /// Name of the command.
        command: String,
        /// The reply type the command should produce.
        expected: &'static str,
        /// The reply type actually received.
        actual: &'static str,
    },

    /// The wire protocol spoken by the store was violated.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend is shut down.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns true if the store could not be reached at all.
    ///
    /// Callers map these to an "unavailable" status rather than an
    /// internal failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::Io(_) | StorageError::Unavailable(_) | StorageError::Closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_classification() {
        assert!(StorageError::Closed.is_unavailable());
        assert!(StorageError::Unavailable("refused".into()).is_unavailable());
        assert!(!StorageError::Protocol("bad byte".into()).is_unavailable());
        assert!(!StorageError::Command {
            command: "HGET".into(),
            message: "WRONGTYPE".into(),
        }
        .is_unavailable());
    }

    #[test]
    fn unexpected_reply_display() {
        let err = StorageError::UnexpectedReply {
            command: "HSET".into(),
            expected: "integer",
            actual: "nil",
        };
        let msg = err.to_string();
        assert!(msg.contains("HSET"));
        assert!(msg.contains("integer"));
        assert!(msg.contains("nil"));
    }
}
