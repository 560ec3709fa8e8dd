//! Error types for panotile-media.

use panotile_bitstream::BitstreamError;
use std::io;
use thiserror::Error;

/// Result type for panotile-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for panotile-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream could not be framed or parsed.
    #[error("Bitstream error: {0}")]
    Bitstream(#[from] BitstreamError),

    /// The stream is framed correctly but its structure is unusable.
    #[error("Invalid stream: {0}")]
    InvalidStream(String),

    /// Requested frame is past the end of the stream.
    #[error("Frame {frame} out of range (frame count: {count})")]
    FrameOutOfRange { frame: u32, count: u32 },

    /// Invalid GOP index.
    #[error("Invalid GOP index: {index} (count: {count})")]
    InvalidGopIndex { index: u32, count: u32 },
}

impl Error {
    /// Create an invalid stream error.
    pub fn invalid_stream(msg: impl Into<String>) -> Self {
        Self::InvalidStream(msg.into())
    }
}
