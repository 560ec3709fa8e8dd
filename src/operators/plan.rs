//! Choosing which tiles, and which of their frames, a query reads.

use crate::catalog::TiledEntry;
use crate::semantic::SemanticDataManager;
use crate::tiles::{TileInformation, TileLocationProvider};
use crate::Result;

/// The run of `frames[start..]` stored under the same span as `frames[start]`.
///
/// Frames in one span share both the layout and the tile files, so a run
/// can be served from one set of open readers.
pub fn next_group_of_frames_with_same_layout_and_file<'a>(
    provider: &TileLocationProvider,
    frames: &'a [u32],
    start: usize,
) -> Result<&'a [u32]> {
    let rest = &frames[start.min(frames.len())..];
    let Some(&first) = rest.first() else {
        return Ok(rest);
    };
    let span = provider.span_for_frame(first)?;
    let len = rest
        .iter()
        .position(|&frame| !span.contains(frame))
        .unwrap_or(rest.len());
    Ok(&rest[..len])
}

/// Tiles a query touches, each with the frames it is needed for.
#[derive(Debug, Clone, Default)]
pub struct ScanPlan {
    tiles: Vec<TileInformation>,
}

impl ScanPlan {
    /// Work out, span by span, which tiles intersect at least one box and in
    /// which frames.
    ///
    /// With `sort_by_size` the result is ordered by tile height then width;
    /// the sort is stable so equal sizes keep tile order. Otherwise tiles
    /// appear span by span in tile order.
    pub fn preprocess(
        entry: &TiledEntry,
        semantic: &SemanticDataManager,
        provider: &TileLocationProvider,
        sort_by_size: bool,
    ) -> Result<Self> {
        let frames = semantic.ordered_frames();
        let mut tiles = Vec::new();
        let mut start = 0;

        while start < frames.len() {
            let group = next_group_of_frames_with_same_layout_and_file(provider, frames, start)?;
            start += group.len();

            let layout = provider.layout_for_frame(group[0])?;
            let mut per_tile: Vec<Vec<u32>> = vec![Vec::new(); layout.tile_count() as usize];
            for &frame in group {
                for rect in semantic.rectangles_for_frame(frame) {
                    for tile in layout.tiles_intersecting(rect) {
                        let needed = &mut per_tile[tile as usize];
                        if needed.last() != Some(&frame) {
                            needed.push(frame);
                        }
                    }
                }
            }

            for (tile, frames) in per_tile.into_iter().enumerate() {
                if frames.is_empty() {
                    continue;
                }
                let mut info = provider.tile_information(tile as u32, frames[0])?;
                info.frames = frames;
                tiles.push(info);
            }
        }

        if sort_by_size {
            tiles.sort_by_key(TileInformation::size_key);
        }

        tracing::debug!(
            entry = %entry.name(),
            version = %provider.version(),
            frames = frames.len(),
            tiles = tiles.len(),
            "Planned tile scan"
        );
        Ok(Self { tiles })
    }

    pub fn tiles(&self) -> &[TileInformation] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn into_tiles(self) -> Vec<TileInformation> {
        self.tiles
    }
}
