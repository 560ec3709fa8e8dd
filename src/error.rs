//! Error type for the tile engine.

use panotile_bitstream::BitstreamError;
use panotile_common::{LayoutVersion, Rectangle};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for panotile operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a rectangle set does not tile a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// The layout has no tiles, or a zero-sized frame.
    #[error("Layout is empty")]
    Empty,

    /// Part of the frame is covered by no tile.
    #[error("Frame sample ({x}, {y}) is not covered by any tile")]
    Gap { x: u32, y: u32 },

    /// Two tiles cover the same samples.
    #[error("Tiles {first} and {second} overlap")]
    Overlap { first: u32, second: u32 },

    /// A tile extends past the frame.
    #[error("Tile {tile} extends outside the {width}x{height} frame")]
    OutOfBounds { tile: u32, width: u32, height: u32 },

    /// The rectangles tile the frame but do not form a row/column grid.
    #[error("Tiles do not form a grid: {0}")]
    NotAGrid(String),
}

/// Error type for panotile operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure reading shared catalog naming state.
    #[error(transparent)]
    Common(#[from] panotile_common::Error),

    /// Malformed or unrewritable bitstream.
    #[error(transparent)]
    Bitstream(#[from] BitstreamError),

    /// Tile stream could not be indexed.
    #[error(transparent)]
    Media(#[from] panotile_media::Error),

    /// Invalid tile layout.
    #[error("Invalid layout: {0}")]
    Layout(#[from] LayoutError),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An object box is split across tile boundaries.
    #[error("Object {object} in frame {frame} crosses the boundary of tile {tile}")]
    CrossTileObject {
        frame: u32,
        object: Rectangle,
        tile: u32,
    },

    /// Tiles of one GOP disagree on picture count or keyframe positions.
    #[error("GOP {gop} structure differs between tile 0 and tile {tile}: {detail}")]
    GopStructureMismatch { gop: u32, tile: u32, detail: String },

    /// A tile file could not be read.
    #[error("Tile {tile} is unreadable at {path:?}: {reason}")]
    UnreadableTile {
        tile: u32,
        path: PathBuf,
        reason: String,
    },

    /// A requested frame is outside the stored video.
    #[error("Frame {frame} out of range (frame count: {frame_count})")]
    FrameOutOfRange { frame: u32, frame_count: u32 },

    /// Nothing has been stored for the entry.
    #[error("Entry '{0}' has no stored layout")]
    NotStored(String),

    /// Stored layout version files are missing or inconsistent.
    #[error("Layout version {version} of '{entry}' is unusable: {reason}")]
    CorruptVersion {
        entry: String,
        version: LayoutVersion,
        reason: String,
    },

    /// Re-tiling did not complete; the previous layout remains current.
    #[error("Retile of '{video}' failed: {reason}")]
    RetileFailed { video: String, reason: String },

    /// An external tool was not found.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// An external tool exited with an error.
    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound(tool.into())
    }

    /// Create a tool failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn retile_failed(video: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::RetileFailed {
            video: video.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_tile_display() {
        let err = Error::CrossTileObject {
            frame: 5,
            object: Rectangle::new(3, 150, 10, 20, 20),
            tile: 0,
        };
        let message = err.to_string();
        assert!(message.contains("frame 5"));
        assert!(message.contains("tile 0"));
    }

    #[test]
    fn test_layout_error_wraps() {
        let err: Error = LayoutError::Gap { x: 0, y: 120 }.into();
        assert_eq!(
            err.to_string(),
            "Invalid layout: Frame sample (0, 120) is not covered by any tile"
        );
    }

    #[test]
    fn test_bitstream_error_is_transparent() {
        let err: Error = BitstreamError::overflow("num_tile_columns_minus1", 3, 5).into();
        assert!(matches!(err, Error::Bitstream(ref e) if e.is_width_overflow()));
        assert!(err.to_string().starts_with("Field num_tile_columns_minus1"));
    }
}
