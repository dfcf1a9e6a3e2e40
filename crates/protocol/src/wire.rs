//! Frame codec for the data service connection.
//!
//! # Wire format
//!
//! ```text
//! FRAME (both directions):
//!   [4 bytes BE: frame_len]      = 4 + header_len + payload_len
//!   [4 bytes BE: header_len]
//!   [header_len bytes: JSON header (Request or Response)]
//!   [rest: raw payload bytes]
//! ```
//!
//! Write requests carry file bytes in the payload, and `data` replies carry
//! the chunk that was read. All other frames have an empty payload.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::service::ServiceError;

/// Upper bound on a single frame (64 MiB).
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Largest payload a single frame carries, leaving room for the JSON header.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - 64 * 1024;

/// Errors produced by the frame codec.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {0} bytes (max {MAX_FRAME_LEN})")]
    FrameTooLarge(usize),

    #[error("header truncated: expected {expected} bytes, got {got}")]
    HeaderTruncated { expected: usize, got: usize },

    #[error("invalid header JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<WireError> for ServiceError {
    fn from(err: WireError) -> Self {
        ServiceError::Transport(err.to_string())
    }
}

/// Encodes a header and payload into a single frame.
pub fn encode_frame<T: Serialize>(header: &T, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let header_json = serde_json::to_vec(header)?;
    let frame_len = 4 + header_json.len() + payload.len();
    if frame_len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(frame_len));
    }

    let mut buf = Vec::with_capacity(4 + frame_len);
    buf.extend_from_slice(&(frame_len as u32).to_be_bytes());
    buf.extend_from_slice(&(header_json.len() as u32).to_be_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Splits a frame body (everything after `frame_len`) into header and payload.
pub fn decode_frame<T: DeserializeOwned>(body: &[u8]) -> Result<(T, Vec<u8>), WireError> {
    if body.len() < 4 {
        return Err(WireError::HeaderTruncated {
            expected: 4,
            got: body.len(),
        });
    }

    let header_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
    if body.len() < 4 + header_len {
        return Err(WireError::HeaderTruncated {
            expected: header_len,
            got: body.len() - 4,
        });
    }

    let header = serde_json::from_slice(&body[4..4 + header_len])?;
    let payload = body[4 + header_len..].to_vec();
    Ok((header, payload))
}

/// Writes one frame and flushes the stream.
pub async fn write_frame<W, T>(writer: &mut W, header: &T, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(header, payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `None` if the peer closed the stream cleanly at a frame boundary.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<(T, Vec<u8>)>, WireError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let frame_len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if frame_len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(frame_len));
    }

    let mut body = vec![0u8; frame_len];
    reader.read_exact(&mut body).await?;
    decode_frame(&body).map(Some)
}
