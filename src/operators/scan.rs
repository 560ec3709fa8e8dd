//! Per-tile scan operators.

use super::plan::ScanPlan;
use super::{open_tile, EncodedFrames, Operator, ScanOptions};
use crate::catalog::TiledEntry;
use crate::semantic::SemanticDataManager;
use crate::tiles::{TileInformation, TileLocationProvider};
use crate::{Error, Result};
use panotile_common::Rectangle;
use std::sync::Arc;

/// Work done by a scan, for logging and cost accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStatistics {
    pub tiles_read: u64,
    pub tiles_skipped: u64,
    pub frames_read: u64,
    pub pixels_read: u64,
    pub bytes_read: u64,
}

/// Reads the encoded data of every tile a query touches.
///
/// Yields one [`EncodedFrames`] per planned tile.
pub struct ScanTiledVideoOperator {
    entry: String,
    semantic: SemanticDataManager,
    provider: Arc<TileLocationProvider>,
    options: ScanOptions,
    tiles: Vec<TileInformation>,
    cursor: usize,
    statistics: ScanStatistics,
    complete: bool,
}

impl ScanTiledVideoOperator {
    pub fn new(
        entry: &TiledEntry,
        semantic: SemanticDataManager,
        provider: Arc<TileLocationProvider>,
        options: ScanOptions,
    ) -> Result<Self> {
        let plan = ScanPlan::preprocess(entry, &semantic, &provider, options.sort_by_size)?;
        Ok(Self {
            entry: entry.name().to_string(),
            semantic,
            provider,
            options,
            tiles: plan.into_tiles(),
            cursor: 0,
            statistics: ScanStatistics::default(),
            complete: false,
        })
    }

    pub fn statistics(&self) -> ScanStatistics {
        self.statistics
    }

    pub fn provider(&self) -> &Arc<TileLocationProvider> {
        &self.provider
    }

    /// Planned tiles, in emission order.
    pub fn tiles(&self) -> &[TileInformation] {
        &self.tiles
    }

    fn check_single_tile_objects(&self, info: &TileInformation) -> Result<()> {
        for &frame in &info.frames {
            for object in self.semantic.rectangles_for_frame(frame) {
                if info.rectangle.intersects(object) && !info.rectangle.contains(object) {
                    return Err(Error::CrossTileObject {
                        frame,
                        object: *object,
                        tile: info.tile,
                    });
                }
            }
        }
        Ok(())
    }

    fn read_tile(&mut self, info: &TileInformation) -> Result<Option<EncodedFrames>> {
        let reader = match open_tile(&info.path, info.tile) {
            Ok(reader) => reader,
            Err(e) if self.options.allow_degraded => {
                tracing::warn!(tile = info.tile, path = %info.path.display(), "Skipping tile: {e}");
                self.statistics.tiles_skipped += 1;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let local: Vec<u32> = info.local_frames().collect();
        let local = if self.options.read_entire_gops {
            reader.index().expand_to_gops(&local)
        } else {
            local
        };
        let data = reader.read_frames(&local)?;

        let frames: Vec<u32> = local.iter().map(|f| f + info.frame_offset).collect();
        self.statistics.tiles_read += 1;
        self.statistics.frames_read += frames.len() as u64;
        self.statistics.pixels_read += info.rectangle.area() * frames.len() as u64;
        self.statistics.bytes_read += data.len() as u64;

        Ok(Some(EncodedFrames {
            tile: Some(info.tile),
            rectangle: info.rectangle,
            frames,
            data,
        }))
    }
}

impl Operator for ScanTiledVideoOperator {
    type Item = EncodedFrames;

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn next(&mut self) -> Result<Option<EncodedFrames>> {
        while let Some(info) = self.tiles.get(self.cursor).cloned() {
            self.cursor += 1;
            if self.options.require_single_tile_objects {
                self.check_single_tile_objects(&info)?;
            }
            if let Some(frames) = self.read_tile(&info)? {
                return Ok(Some(frames));
            }
        }

        if !self.complete {
            self.complete = true;
            let s = self.statistics;
            tracing::debug!(
                entry = %self.entry,
                tiles = s.tiles_read,
                skipped = s.tiles_skipped,
                frames = s.frames_read,
                pixels = s.pixels_read,
                bytes = s.bytes_read,
                "Tile scan finished"
            );
        }
        Ok(None)
    }
}

/// A tile together with the boxes that overlap it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TileAndRectangleInformation {
    pub tile: TileInformation,
    /// `(frame, box)` pairs, in frame order.
    pub rectangles: Vec<(u32, Rectangle)>,
}

/// Lists touched tiles and their boxes without reading payload.
///
/// Tiles are yielded span by span in tile order.
pub struct ScanTileAndRectangleInformationOperator {
    semantic: SemanticDataManager,
    tiles: std::vec::IntoIter<TileInformation>,
    complete: bool,
}

impl ScanTileAndRectangleInformationOperator {
    pub fn new(
        entry: &TiledEntry,
        semantic: SemanticDataManager,
        provider: &TileLocationProvider,
    ) -> Result<Self> {
        let plan = ScanPlan::preprocess(entry, &semantic, provider, false)?;
        Ok(Self {
            semantic,
            tiles: plan.into_tiles().into_iter(),
            complete: false,
        })
    }

    /// Bundle with the largest object dimensions of the query.
    pub fn into_encoded_tile_information(self) -> EncodedTileInformation {
        let (max_object_width, max_object_height) = self
            .semantic
            .rectangles()
            .fold((0, 0), |(w, h), (_, r)| (w.max(r.width), h.max(r.height)));
        EncodedTileInformation {
            max_object_width,
            max_object_height,
            operator: self,
        }
    }
}

impl Operator for ScanTileAndRectangleInformationOperator {
    type Item = TileAndRectangleInformation;

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn next(&mut self) -> Result<Option<TileAndRectangleInformation>> {
        let Some(tile) = self.tiles.next() else {
            self.complete = true;
            return Ok(None);
        };
        let region = tile.rectangle;
        let semantic = &self.semantic;
        let rectangles = tile
            .frames
            .iter()
            .flat_map(move |&frame| {
                semantic
                    .rectangles_for_frame(frame)
                    .iter()
                    .filter(move |r| r.intersects(&region))
                    .map(move |r| (frame, *r))
            })
            .collect();
        Ok(Some(TileAndRectangleInformation { tile, rectangles }))
    }
}

/// Largest object size of a query, with the operator listing its tiles.
pub struct EncodedTileInformation {
    pub max_object_width: u32,
    pub max_object_height: u32,
    pub operator: ScanTileAndRectangleInformationOperator,
}
