//! Pull-based scan operators over a tiled video.
//!
//! An operator is a finite, non-restartable sequence. Callers pull with
//! [`Operator::next`] until it returns `Ok(None)`; from then on
//! [`Operator::is_complete`] is true and `next` keeps returning `Ok(None)`.
//!
//! - `plan` - Grouping query frames by layout span and choosing tiles
//! - `scan` - Per-tile encoded data and per-tile box information
//! - `full_frame` - Whole frames stitched GOP by GOP

mod full_frame;
mod plan;
mod scan;

pub use full_frame::ScanFullFramesFromTiledVideoOperator;
pub use plan::{next_group_of_frames_with_same_layout_and_file, ScanPlan};
pub use scan::{
    EncodedTileInformation, ScanStatistics, ScanTileAndRectangleInformationOperator,
    ScanTiledVideoOperator, TileAndRectangleInformation,
};

use crate::{Error, Result};
use bytes::Bytes;
use panotile_common::Rectangle;
use panotile_media::EncodedFrameReader;
use std::path::Path;

/// A finite pull sequence.
pub trait Operator {
    type Item;

    fn is_complete(&self) -> bool;

    fn next(&mut self) -> Result<Option<Self::Item>>;
}

/// Encoded data for one tile (or the whole frame) over a set of frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrames {
    /// `None` when the data covers the full frame.
    pub tile: Option<u32>,
    /// Region of the frame the data decodes to.
    pub rectangle: Rectangle,
    /// Global frame numbers, ascending.
    pub frames: Vec<u32>,
    /// Annex B stream, parameter sets first.
    pub data: Bytes,
}

/// Knobs shared by the scan operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Extend partial GOP reads to whole GOPs.
    pub read_entire_gops: bool,
    /// Fail when an object box is split between tiles.
    pub require_single_tile_objects: bool,
    /// Skip unreadable tile files instead of failing.
    pub allow_degraded: bool,
    /// Emit smaller tiles first.
    pub sort_by_size: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            read_entire_gops: true,
            require_single_tile_objects: false,
            allow_degraded: false,
            sort_by_size: true,
        }
    }
}

/// Open a tile stream, reporting failures as [`Error::UnreadableTile`].
pub(crate) fn open_tile(path: &Path, tile: u32) -> Result<EncodedFrameReader> {
    EncodedFrameReader::open(path).map_err(|e| Error::UnreadableTile {
        tile,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
