//! Client error type.

use tether_core::FrameError;

/// Errors surfaced by the transport client.
///
/// None of these terminate anything: transport failures feed the
/// reconnect loop, call failures resolve the call's own future, and the
/// rest are returned to the caller directly.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Attempted to send while the connection is not open.
    #[error("not connected")]
    NotConnected,

    /// The backend rejected the supplied credentials.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Backend-supplied rejection message.
        message: String,
    },

    /// No response arrived within the call's timeout.
    #[error("call timed out")]
    CallTimeout,

    /// The connection was lost while the call was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// The configured address cannot form a WebSocket URL.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Socket-level failure on the write path.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),
}
