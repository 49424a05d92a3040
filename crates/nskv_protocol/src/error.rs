//! Error types for the wire protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// A payload could not be parsed into a message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame exceeds the configured maximum size.
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Size announced or produced.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// I/O error while reading or writing a frame.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true if the peer closed the connection cleanly between frames.
    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_too_large_display() {
        let err = ProtocolError::FrameTooLarge { size: 10, max: 4 };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn eof_detection() {
        let eof = ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into());
        assert!(eof.is_eof());
        assert!(!ProtocolError::Decode("x".into()).is_eof());
    }
}
