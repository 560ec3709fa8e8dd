//! Fitting non-uniform layouts to observed object boxes.
//!
//! Column cuts are placed at the edges of merged horizontal object intervals
//! and row cuts at the edges of merged vertical ones, so no object is ever
//! split. Cuts closer together than the minimum tile size are dropped
//! greedily from the left (top), which only ever merges neighbouring tiles.

use super::TileLayout;
use crate::error::LayoutError;
use panotile_common::{Rectangle, VideoGeometry};

pub const DEFAULT_MIN_TILE_WIDTH: u32 = 256;
pub const DEFAULT_MIN_TILE_HEIGHT: u32 = 160;
pub const DEFAULT_ALIGNMENT: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutFitter {
    pub min_tile_width: u32,
    pub min_tile_height: u32,
    /// Cuts land on multiples of this value (the CTB size).
    pub alignment: u32,
}

impl Default for LayoutFitter {
    fn default() -> Self {
        Self {
            min_tile_width: DEFAULT_MIN_TILE_WIDTH,
            min_tile_height: DEFAULT_MIN_TILE_HEIGHT,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl LayoutFitter {
    pub fn new(min_tile_width: u32, min_tile_height: u32) -> Self {
        Self {
            min_tile_width,
            min_tile_height,
            ..Self::default()
        }
    }

    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment.max(1);
        self
    }

    /// Fit a layout for a `width` x `height` frame around `boxes`.
    ///
    /// With no boxes, or boxes entirely outside the frame, the result is a
    /// single tile.
    pub fn fit(&self, width: u32, height: u32, boxes: &[Rectangle]) -> Result<TileLayout, LayoutError> {
        if width == 0 || height == 0 {
            return Err(LayoutError::Empty);
        }
        let clipped: Vec<Rectangle> = boxes
            .iter()
            .filter_map(|b| b.clip_to_frame(width, height))
            .collect();

        let columns = self.cuts(
            width,
            self.min_tile_width,
            clipped.iter().map(|b| (b.x, b.right())),
        );
        let rows = self.cuts(
            height,
            self.min_tile_height,
            clipped.iter().map(|b| (b.y, b.bottom())),
        );

        tracing::debug!(
            boxes = clipped.len(),
            columns = columns.len(),
            rows = rows.len(),
            "Fitted tile layout"
        );
        TileLayout::from_dimensions(columns, rows)
    }

    /// Fit one layout per GOP-aligned frame range.
    ///
    /// Each `gop_length` run of frames gets a layout fitted to its own boxes;
    /// neighbouring runs that end up with the same layout are merged into one
    /// span. Returns `(first_frame, last_frame, layout)` triples covering
    /// `[0, frame_count)`.
    pub fn fit_spans(
        &self,
        geometry: VideoGeometry,
        gop_length: u32,
        boxes: &[(u32, Rectangle)],
    ) -> Result<Vec<(u32, u32, TileLayout)>, LayoutError> {
        if geometry.frame_count == 0 {
            return Err(LayoutError::Empty);
        }
        let gop_length = gop_length.max(1);
        let mut spans: Vec<(u32, u32, TileLayout)> = Vec::new();

        let mut first = 0;
        while first < geometry.frame_count {
            let last = first.saturating_add(gop_length).min(geometry.frame_count);
            let in_range: Vec<Rectangle> = boxes
                .iter()
                .filter(|(frame, _)| *frame >= first && *frame < last)
                .map(|(_, b)| *b)
                .collect();
            let layout = self.fit(geometry.width, geometry.height, &in_range)?;

            match spans.last_mut() {
                Some(previous) if previous.2 == layout => previous.1 = last,
                _ => spans.push((first, last, layout)),
            }
            first = last;
        }
        Ok(spans)
    }

    /// Span sizes along one axis of length `extent`.
    fn cuts(
        &self,
        extent: u32,
        min_size: u32,
        intervals: impl Iterator<Item = (u32, u32)>,
    ) -> Vec<u32> {
        let align = self.alignment.max(1);
        let mut aligned: Vec<(u32, u32)> = intervals
            .map(|(start, end)| {
                let start = start / align * align;
                let end = end.div_ceil(align).saturating_mul(align).min(extent);
                (start, end)
            })
            .collect();
        aligned.sort_unstable();

        let mut merged: Vec<(u32, u32)> = Vec::new();
        for (start, end) in aligned {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        let mut candidates: Vec<u32> = merged
            .iter()
            .flat_map(|&(start, end)| [start, end])
            .filter(|&c| c > 0 && c < extent)
            .collect();
        candidates.dedup();

        let mut boundaries = vec![0];
        for cut in candidates {
            let last = boundaries.last().copied().unwrap_or(0);
            if cut - last >= min_size && extent - cut >= min_size {
                boundaries.push(cut);
            }
        }
        boundaries.push(extent);

        boundaries.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_boxes_is_single_tile() {
        let layout = LayoutFitter::default().fit(1920, 1080, &[]).unwrap();
        assert_eq!(layout.grid_dimensions(), (1, 1));
    }

    #[test]
    fn test_box_is_isolated() {
        let fitter = LayoutFitter::default();
        let boxes = [Rectangle::new(1, 700, 400, 300, 200)];
        let layout = fitter.fit(1920, 1080, &boxes).unwrap();

        // 700 -> 640, 1000 -> 1024; 400 -> 384, 600 -> 640
        assert_eq!(layout.column_widths(), &[640, 384, 896]);
        assert_eq!(layout.row_heights(), &[384, 256, 440]);
        let tiles = layout.tiles_intersecting(&boxes[0]);
        assert_eq!(tiles, vec![4]);
    }

    #[test]
    fn test_small_spans_merge() {
        let fitter = LayoutFitter::new(256, 160).with_alignment(1);
        // cut at 100 is too close to the left edge, 1800 to the right
        let boxes = [Rectangle::new(1, 100, 0, 1700, 50)];
        let layout = fitter.fit(1920, 1080, &boxes).unwrap();
        assert_eq!(layout.columns(), 1);
        assert!(layout.row_heights().iter().all(|&h| h >= 160));
    }

    #[test]
    fn test_fitted_tiles_never_split_objects() {
        let fitter = LayoutFitter::default();
        let boxes = [
            Rectangle::new(1, 10, 10, 100, 100),
            Rectangle::new(2, 90, 500, 400, 300),
            Rectangle::new(3, 1500, 200, 200, 600),
        ];
        let layout = fitter.fit(1920, 1080, &boxes).unwrap();
        for b in &boxes {
            let tiles = layout.tiles_intersecting(b);
            let covering: Vec<_> = tiles
                .iter()
                .filter_map(|&t| layout.rectangle(t))
                .collect();
            let columns: std::collections::BTreeSet<_> = covering.iter().map(|r| r.x).collect();
            // overlapping x intervals merge, so each object stays in one column band
            assert_eq!(columns.len(), 1, "object {b} spans columns");
        }
        assert!(layout.column_widths().iter().all(|&w| w >= 256));
        assert!(layout.row_heights().iter().all(|&h| h >= 160));
    }

    #[test]
    fn test_fit_spans_per_gop() {
        let geometry = VideoGeometry {
            width: 1920,
            height: 1080,
            frame_count: 25,
        };
        let boxes = [
            (3, Rectangle::new(1, 700, 400, 300, 200)),
            (22, Rectangle::new(2, 700, 400, 300, 200)),
        ];
        let spans = LayoutFitter::default().fit_spans(geometry, 10, &boxes).unwrap();

        let ranges: Vec<(u32, u32)> = spans.iter().map(|s| (s.0, s.1)).collect();
        assert_eq!(ranges, vec![(0, 10), (10, 20), (20, 25)]);
        assert_eq!(spans[0].2.tile_count(), 9);
        assert_eq!(spans[1].2.tile_count(), 1);
        assert_eq!(spans[2].2, spans[0].2);
    }

    #[test]
    fn test_fit_spans_merges_equal_layouts() {
        let geometry = VideoGeometry {
            width: 1920,
            height: 1080,
            frame_count: 30,
        };
        let spans = LayoutFitter::default().fit_spans(geometry, 10, &[]).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].0, spans[0].1), (0, 30));
    }
}
