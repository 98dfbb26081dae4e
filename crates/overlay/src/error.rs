//! Error types for overlay framing.

use thiserror::Error;

/// Errors that can occur while framing or unframing peer messages.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The 6-byte header carries flag bits that make no sense.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The header names a compression algorithm this node does not speak.
    #[error("unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(u8),

    /// The payload exceeds the protocol limit.
    #[error("message too large: {size} bytes (limit: {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    /// Received an unexpected or malformed message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Compressing or decompressing a payload failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OverlayError {
    /// Returns true if the connection the error came from should be dropped.
    ///
    /// Every framing error leaves the byte stream out of sync except a failed
    /// payload decompression, which consumed exactly one frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OverlayError::Compression(_))
    }
}
