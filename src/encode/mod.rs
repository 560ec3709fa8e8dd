//! Pixel encoding of tiles.
//!
//! Encoding and decoding pixels is outside this crate; the [`TileEncoder`]
//! trait is the seam. [`FfmpegTileEncoder`] drives the ffmpeg command line.

mod ffmpeg;

pub use ffmpeg::FfmpegTileEncoder;

use crate::Result;
use panotile_common::{Rectangle, VideoGeometry};
use std::path::{Path, PathBuf};

/// One tile to produce: the region of the source frame and where to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOutput {
    pub rectangle: Rectangle,
    pub path: PathBuf,
}

/// Encode frames `[first_frame, last_frame)` of `source` once per output,
/// each cropped to its rectangle, with a keyframe every `gop_length` frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileEncodeRequest {
    pub source: PathBuf,
    pub first_frame: u32,
    pub last_frame: u32,
    pub gop_length: u32,
    pub outputs: Vec<TileOutput>,
}

impl TileEncodeRequest {
    pub fn frame_count(&self) -> u32 {
        self.last_frame.saturating_sub(self.first_frame)
    }
}

/// External encoder producing HEVC Annex B tile streams.
pub trait TileEncoder: Send + Sync {
    /// Frame size and length of `source`.
    fn probe(&self, source: &Path) -> Result<VideoGeometry>;

    /// Write every output of `request`.
    ///
    /// Tile streams must start on a keyframe and place keyframes at the same
    /// positions, so tiles of one span can be stitched.
    fn encode_tiles(&self, request: &TileEncodeRequest) -> Result<()>;

    /// Write the parameter sets of a full-frame encode of `source` to `output`.
    fn encode_header(&self, source: &Path, output: &Path) -> Result<()>;
}
