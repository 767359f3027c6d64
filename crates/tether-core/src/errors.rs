//! Protocol-level error type.

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Frame JSON could not be encoded or decoded.
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary message shorter than its declared header.
    #[error("truncated binary frame ({len} bytes)")]
    Truncated {
        /// Total bytes actually received.
        len: usize,
    },

    /// Header length prefix exceeds the allowed maximum.
    #[error("frame header too large ({len} bytes)")]
    HeaderTooLarge {
        /// Declared or actual header length.
        len: usize,
    },
}
