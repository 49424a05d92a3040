//! RPC status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome category of an RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// The call succeeded.
    Ok,
    /// `Get` on a key that does not exist.
    NotFound,
    /// The backing store could not be reached.
    Unavailable,
    /// The request could not be decoded or was rejected.
    InvalidRequest,
    /// The call did not complete within the server's request timeout.
    DeadlineExceeded,
    /// Any other failure.
    Internal,
}

impl StatusCode {
    /// Returns the stable numeric code for this status.
    pub fn as_u8(self) -> u8 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::NotFound => 5,
            StatusCode::Unavailable => 14,
            StatusCode::InvalidRequest => 3,
            StatusCode::DeadlineExceeded => 4,
            StatusCode::Internal => 13,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "ok",
            StatusCode::NotFound => "not found",
            StatusCode::Unavailable => "unavailable",
            StatusCode::InvalidRequest => "invalid request",
            StatusCode::DeadlineExceeded => "deadline exceeded",
            StatusCode::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A failed RPC outcome carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Failure category.
    pub code: StatusCode,
    /// Human-readable detail.
    pub message: String,
}

impl Status {
    /// Creates a status with the given code and message.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a `NotFound` status.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    /// Creates an `Unavailable` status.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    /// Creates an `InvalidRequest` status.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidRequest, message)
    }

    /// Creates an `Internal` status.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    /// Returns true if this is a `NotFound` status.
    pub fn is_not_found(&self) -> bool {
        self.code == StatusCode::NotFound
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let status = Status::not_found("Failed to find the key");
        assert_eq!(status.to_string(), "not found: Failed to find the key");
        assert!(status.is_not_found());
    }

    #[test]
    fn numeric_codes_are_distinct() {
        let codes = [
            StatusCode::Ok,
            StatusCode::NotFound,
            StatusCode::Unavailable,
            StatusCode::InvalidRequest,
            StatusCode::DeadlineExceeded,
            StatusCode::Internal,
        ];
        let mut numbers: Vec<u8> = codes.iter().map(|c| c.as_u8()).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), codes.len());
    }
}
