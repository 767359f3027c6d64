//! Binary framing for blob-carrying stream messages.
//!
//! Layout: 4-byte big-endian header length, JSON-encoded header
//! [`Frame`], then the opaque blob bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::FrameError;
use crate::frame::Frame;

/// Upper bound on the JSON header, to reject corrupt length prefixes.
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// Encode a header frame and blob into one binary message.
pub fn encode(frame: &Frame, blob: &[u8]) -> Result<Bytes, FrameError> {
    let header = serde_json::to_vec(frame)?;
    if header.len() > MAX_HEADER_LEN {
        return Err(FrameError::HeaderTooLarge { len: header.len() });
    }
    #[allow(clippy::cast_possible_truncation)]
    let len = header.len() as u32;
    let mut out = BytesMut::with_capacity(4 + header.len() + blob.len());
    out.put_u32(len);
    out.put_slice(&header);
    out.put_slice(blob);
    Ok(out.freeze())
}

/// Decode a binary message into its header frame and blob.
pub fn decode(data: &[u8]) -> Result<(Frame, Bytes), FrameError> {
    if data.len() < 4 {
        return Err(FrameError::Truncated { len: data.len() });
    }
    let header_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if header_len > MAX_HEADER_LEN {
        return Err(FrameError::HeaderTooLarge { len: header_len });
    }
    if data.len() < 4 + header_len {
        return Err(FrameError::Truncated { len: data.len() });
    }
    let frame: Frame = serde_json::from_slice(&data[4..4 + header_len])?;
    Ok((frame, Bytes::copy_from_slice(&data[4 + header_len..])))
}
