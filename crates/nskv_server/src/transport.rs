//! Async frame I/O shared by the server and the client.

use nskv_protocol::{decode_header, encode_frame, ProtocolResult, HEADER_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads one frame payload.
///
/// Returns `Ok(None)` when the peer closes the stream between frames. A
/// stream that ends inside a frame is an error.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> ProtocolResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }

    let len = decode_header(header, max)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Writes one frame and flushes.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload, max)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nskv_protocol::ProtocolError;

    #[tokio::test]
    async fn frames_round_trip_over_a_pipe() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"one", 1024).await.unwrap();
        write_frame(&mut a, b"", 1024).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, 1024).await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(read_frame(&mut b, 1024).await.unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut b, 1024).await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_header_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 0]).await.unwrap();
        drop(a);
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert!(err.is_eof());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_reading() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 1, 0, 0]).await.unwrap();
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }
}
