//! Whole-frame reads, stitched from every tile of the layout.

use super::plan::next_group_of_frames_with_same_layout_and_file;
use super::{open_tile, EncodedFrames, Operator};
use crate::catalog::TiledEntry;
use crate::semantic::SemanticDataManager;
use crate::stitch::StitchContext;
use crate::tiles::TileLocationProvider;
use crate::Result;
use panotile_common::Rectangle;
use panotile_media::EncodedFrameReader;
use std::collections::VecDeque;
use std::sync::Arc;

/// Readers and stitch state for one span.
struct ActiveSpan {
    readers: Vec<EncodedFrameReader>,
    context: StitchContext,
    frame_offset: u32,
    gops: VecDeque<u32>,
}

/// Yields one stitched [`EncodedFrames`] per GOP touched by the query.
pub struct ScanFullFramesFromTiledVideoOperator {
    entry: String,
    provider: Arc<TileLocationProvider>,
    frames: Vec<u32>,
    cursor: usize,
    active: Option<ActiveSpan>,
    gops_emitted: u64,
    did_signal_eos: bool,
}

impl ScanFullFramesFromTiledVideoOperator {
    pub fn new(
        entry: &TiledEntry,
        semantic: &SemanticDataManager,
        provider: Arc<TileLocationProvider>,
    ) -> Self {
        Self {
            entry: entry.name().to_string(),
            provider,
            frames: semantic.ordered_frames().to_vec(),
            cursor: 0,
            active: None,
            gops_emitted: 0,
            did_signal_eos: false,
        }
    }

    /// Open every tile of the span holding `group` and queue its GOPs.
    fn open_span(&self, group: &[u32]) -> Result<ActiveSpan> {
        let first = group[0];
        let span = self.provider.span_for_frame(first)?;

        let mut readers = Vec::with_capacity(span.layout.tile_count() as usize);
        for tile in 0..span.layout.tile_count() {
            let path = self.provider.location_of_tile_for_frame(tile, first)?;
            readers.push(open_tile(&path, tile)?);
        }

        let header_path = self.provider.metadata_path_for_frame(first)?;
        let header = if header_path.exists() {
            Some(EncodedFrameReader::open(&header_path)?)
        } else {
            tracing::debug!(
                path = %header_path.display(),
                "No full-frame header, using tile 0 parameter sets"
            );
            None
        };
        let context = StitchContext::from_tiles(&span.layout, header.as_ref(), &readers)?;

        let mut gops: Vec<u32> = group
            .iter()
            .filter_map(|&frame| readers[0].gop_for_frame(frame - span.first_frame))
            .map(|gop| gop.index)
            .collect();
        gops.dedup();

        Ok(ActiveSpan {
            readers,
            context,
            frame_offset: span.first_frame,
            gops: gops.into(),
        })
    }
}

impl Operator for ScanFullFramesFromTiledVideoOperator {
    type Item = EncodedFrames;

    fn is_complete(&self) -> bool {
        self.did_signal_eos
    }

    fn next(&mut self) -> Result<Option<EncodedFrames>> {
        loop {
            if let Some(active) = &mut self.active {
                if let Some(gop) = active.gops.pop_front() {
                    let packet = active.context.stitch_gop(&active.readers, gop)?;
                    let first = packet.first_frame + active.frame_offset;
                    self.gops_emitted += 1;
                    return Ok(Some(EncodedFrames {
                        tile: None,
                        rectangle: Rectangle::new(
                            0,
                            0,
                            0,
                            self.provider.manifest().width,
                            self.provider.manifest().height,
                        ),
                        frames: (first..first + packet.frame_count).collect(),
                        data: packet.data,
                    }));
                }
                self.active = None;
            }

            let group =
                next_group_of_frames_with_same_layout_and_file(&self.provider, &self.frames, self.cursor)?;
            if group.is_empty() {
                break;
            }
            let active = self.open_span(group)?;
            self.cursor += group.len();
            self.active = Some(active);
        }

        if !self.did_signal_eos {
            self.did_signal_eos = true;
            tracing::debug!(
                entry = %self.entry,
                gops = self.gops_emitted,
                "Full-frame scan finished"
            );
        }
        Ok(None)
    }
}
