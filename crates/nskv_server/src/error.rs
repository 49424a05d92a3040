//! Error types for the key/value server and client.

use nskv_protocol::{ProtocolError, Status};
use nskv_storage::StorageError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the key/value server or client.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Wire protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The remote end answered with a failure status.
    #[error("remote call failed: {0}")]
    Remote(Status),

    /// The remote end answered with a reply that does not match the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps a backend failure onto the status sent to an RPC caller.
pub fn storage_status(err: &StorageError) -> Status {
    if err.is_unavailable() {
        Status::unavailable(err.to_string())
    } else {
        Status::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nskv_protocol::StatusCode;

    #[test]
    fn storage_errors_map_to_status() {
        let unavailable = storage_status(&StorageError::Unavailable("refused".into()));
        assert_eq!(unavailable.code, StatusCode::Unavailable);

        let bad_reply = storage_status(&StorageError::Protocol("garbage".into()));
        assert_eq!(bad_reply.code, StatusCode::Internal);
        assert!(bad_reply.message.contains("garbage"));
    }

    #[test]
    fn remote_status_is_displayed() {
        let err = ServerError::Remote(Status::not_found("Failed to find the key"));
        assert!(err.to_string().contains("not found"));
    }
}
