//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.
//! Transports read the header, check it against their limit, then read
//! exactly that many bytes.

use crate::error::{ProtocolError, ProtocolResult};

/// Size of the length header.
pub const HEADER_LEN: usize = 4;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Prepends the length header to `payload`.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the payload exceeds `max`.
pub fn encode_frame(payload: &[u8], max: usize) -> ProtocolResult<Vec<u8>> {
    check_len(payload.len(), max)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Parses a length header.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the announced length exceeds `max`.
pub fn decode_header(header: [u8; HEADER_LEN], max: usize) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(header) as usize;
    check_len(len, max)?;
    Ok(len)
}

fn check_len(size: usize, max: usize) -> ProtocolResult<()> {
    if size > max || size > u32::MAX as usize {
        return Err(ProtocolError::FrameTooLarge { size, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_is_big_endian() {
        let frame = encode_frame(b"abc", 16).unwrap();
        assert_eq!(frame, vec![0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn oversized_payload_rejected() {
        let err = encode_frame(&[0u8; 17], 16).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { size: 17, max: 16 }));
        assert!(decode_header([0, 0, 1, 0], 255).is_err());
    }

    proptest! {
        #[test]
        fn consecutive_frames_read_back(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8)
        ) {
            let mut stream = Vec::new();
            for p in &payloads {
                stream.extend(encode_frame(p, 64).unwrap());
            }
            let mut offset = 0;
            for p in &payloads {
                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&stream[offset..offset + HEADER_LEN]);
                let len = decode_header(header, 64).unwrap();
                offset += HEADER_LEN;
                prop_assert_eq!(&stream[offset..offset + len], p.as_slice());
                offset += len;
            }
            prop_assert_eq!(offset, stream.len());
        }
    }
}
