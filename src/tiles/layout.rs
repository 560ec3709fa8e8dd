//! Tile grids over a frame.

use crate::error::LayoutError;
use panotile_common::Rectangle;
use serde::{Deserialize, Serialize};

/// A row/column tile grid covering a whole frame.
///
/// Tiles are numbered row-major. Column widths and row heights may differ,
/// which is how non-uniform layouts are expressed. A layout is immutable once
/// built; every constructor validates full coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridRepr", into = "GridRepr")]
pub struct TileLayout {
    width: u32,
    height: u32,
    column_widths: Vec<u32>,
    row_heights: Vec<u32>,
    column_starts: Vec<u32>,
    row_starts: Vec<u32>,
}

#[derive(Serialize, Deserialize)]
struct GridRepr {
    column_widths: Vec<u32>,
    row_heights: Vec<u32>,
}

impl TryFrom<GridRepr> for TileLayout {
    type Error = LayoutError;

    fn try_from(repr: GridRepr) -> Result<Self, Self::Error> {
        TileLayout::from_dimensions(repr.column_widths, repr.row_heights)
    }
}

impl From<TileLayout> for GridRepr {
    fn from(layout: TileLayout) -> Self {
        Self {
            column_widths: layout.column_widths,
            row_heights: layout.row_heights,
        }
    }
}

fn starts(sizes: &[u32]) -> Vec<u32> {
    sizes
        .iter()
        .scan(0u32, |acc, &size| {
            let start = *acc;
            *acc += size;
            Some(start)
        })
        .collect()
}

/// Split `extent` into `parts` spans with boundaries at `i * extent / parts`.
fn uniform_sizes(extent: u32, parts: u32) -> Vec<u32> {
    let boundary = |i: u32| (u64::from(i) * u64::from(extent) / u64::from(parts)) as u32;
    (0..parts).map(|i| boundary(i + 1) - boundary(i)).collect()
}

/// Indices of the spans in `starts`/`sizes` that intersect `[from, to)`.
fn spans_touching(starts: &[u32], sizes: &[u32], from: u32, to: u32) -> std::ops::Range<usize> {
    let first = starts
        .iter()
        .zip(sizes)
        .position(|(&s, &len)| s + len > from)
        .unwrap_or(starts.len());
    let end = starts.partition_point(|&s| s < to);
    first..end.max(first)
}

impl TileLayout {
    /// A `rows` x `columns` grid with boundaries at `i * W / columns` and
    /// `j * H / rows`.
    pub fn uniform(width: u32, height: u32, rows: u32, columns: u32) -> Result<Self, LayoutError> {
        if rows == 0 || columns == 0 || width < columns || height < rows {
            return Err(LayoutError::Empty);
        }
        Self::from_dimensions(uniform_sizes(width, columns), uniform_sizes(height, rows))
    }

    /// A grid from explicit column widths and row heights.
    pub fn from_dimensions(
        column_widths: Vec<u32>,
        row_heights: Vec<u32>,
    ) -> Result<Self, LayoutError> {
        if column_widths.is_empty()
            || row_heights.is_empty()
            || column_widths.contains(&0)
            || row_heights.contains(&0)
        {
            return Err(LayoutError::Empty);
        }

        let width = column_widths
            .iter()
            .try_fold(0u32, |acc, &w| acc.checked_add(w))
            .ok_or(LayoutError::Empty)?;
        let height = row_heights
            .iter()
            .try_fold(0u32, |acc, &h| acc.checked_add(h))
            .ok_or(LayoutError::Empty)?;

        Ok(Self {
            width,
            height,
            column_starts: starts(&column_widths),
            row_starts: starts(&row_heights),
            column_widths,
            row_heights,
        })
    }

    /// Validate that `rectangles` tile a `width` x `height` frame exactly.
    ///
    /// Checks, in order: non-empty input, every tile inside the frame, no two
    /// tiles overlapping, and no sample left uncovered.
    pub fn validate_rectangles(
        width: u32,
        height: u32,
        rectangles: &[Rectangle],
    ) -> Result<(), LayoutError> {
        if rectangles.is_empty() || width == 0 || height == 0 {
            return Err(LayoutError::Empty);
        }

        for (tile, rect) in rectangles.iter().enumerate() {
            if rect.is_empty() {
                return Err(LayoutError::Empty);
            }
            if rect.right() > width || rect.bottom() > height {
                return Err(LayoutError::OutOfBounds {
                    tile: tile as u32,
                    width,
                    height,
                });
            }
        }

        for (i, a) in rectangles.iter().enumerate() {
            for (j, b) in rectangles.iter().enumerate().skip(i + 1) {
                if a.intersects(b) {
                    return Err(LayoutError::Overlap {
                        first: i as u32,
                        second: j as u32,
                    });
                }
            }
        }

        let covered: u64 = rectangles.iter().map(Rectangle::area).sum();
        if covered == u64::from(width) * u64::from(height) {
            return Ok(());
        }

        // The top-left sample of any uncovered region lies on a tile edge.
        let mut xs: Vec<u32> = std::iter::once(0)
            .chain(rectangles.iter().map(Rectangle::right))
            .filter(|&x| x < width)
            .collect();
        let mut ys: Vec<u32> = std::iter::once(0)
            .chain(rectangles.iter().map(Rectangle::bottom))
            .filter(|&y| y < height)
            .collect();
        xs.sort_unstable();
        xs.dedup();
        ys.sort_unstable();
        ys.dedup();

        for &y in &ys {
            for &x in &xs {
                if !rectangles.iter().any(|r| r.contains_point(x, y)) {
                    return Err(LayoutError::Gap { x, y });
                }
            }
        }
        Err(LayoutError::Gap { x: 0, y: 0 })
    }

    /// Build a grid from an arbitrary list of tile rectangles.
    ///
    /// The rectangles must tile the frame and line up in rows and columns.
    /// Tile numbering of the result is row-major regardless of input order.
    pub fn from_rectangles(
        width: u32,
        height: u32,
        rectangles: &[Rectangle],
    ) -> Result<Self, LayoutError> {
        Self::validate_rectangles(width, height, rectangles)?;

        let mut xs: Vec<u32> = rectangles.iter().map(|r| r.x).collect();
        let mut ys: Vec<u32> = rectangles.iter().map(|r| r.y).collect();
        xs.sort_unstable();
        xs.dedup();
        ys.sort_unstable();
        ys.dedup();

        let cells = xs.len() * ys.len();
        if cells != rectangles.len() {
            return Err(LayoutError::NotAGrid(format!(
                "{} tiles but {} columns x {} rows",
                rectangles.len(),
                xs.len(),
                ys.len()
            )));
        }

        let widths = xs
            .iter()
            .zip(xs.iter().skip(1).chain(std::iter::once(&width)))
            .map(|(start, end)| end - start)
            .collect();
        let heights = ys
            .iter()
            .zip(ys.iter().skip(1).chain(std::iter::once(&height)))
            .map(|(start, end)| end - start)
            .collect();
        Self::from_dimensions(widths, heights)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rows(&self) -> u32 {
        self.row_heights.len() as u32
    }

    pub fn columns(&self) -> u32 {
        self.column_widths.len() as u32
    }

    /// `(rows, columns)`
    pub fn grid_dimensions(&self) -> (u32, u32) {
        (self.rows(), self.columns())
    }

    pub fn tile_count(&self) -> u32 {
        self.rows() * self.columns()
    }

    pub fn column_widths(&self) -> &[u32] {
        &self.column_widths
    }

    pub fn row_heights(&self) -> &[u32] {
        &self.row_heights
    }

    /// True when every column (and every row) boundary sits at `i * W / n`.
    pub fn is_uniform(&self) -> bool {
        self.column_widths == uniform_sizes(self.width, self.columns())
            && self.row_heights == uniform_sizes(self.height, self.rows())
    }

    /// Region of `tile`, with the tile index as its id.
    pub fn rectangle(&self, tile: u32) -> Option<Rectangle> {
        if tile >= self.tile_count() {
            return None;
        }
        let row = (tile / self.columns()) as usize;
        let column = (tile % self.columns()) as usize;
        Some(Rectangle::new(
            tile,
            self.column_starts[column],
            self.row_starts[row],
            self.column_widths[column],
            self.row_heights[row],
        ))
    }

    /// Every tile region in tile order.
    pub fn rectangles(&self) -> Vec<Rectangle> {
        (0..self.tile_count())
            .filter_map(|tile| self.rectangle(tile))
            .collect()
    }

    pub fn tile_for_point(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let column = self.column_starts.partition_point(|&s| s <= x) - 1;
        let row = self.row_starts.partition_point(|&s| s <= y) - 1;
        Some(row as u32 * self.columns() + column as u32)
    }

    /// Tiles sharing at least one sample with `rect`, in tile order.
    pub fn tiles_intersecting(&self, rect: &Rectangle) -> Vec<u32> {
        let Some(clipped) = rect.clip_to_frame(self.width, self.height) else {
            return Vec::new();
        };
        let columns = spans_touching(
            &self.column_starts,
            &self.column_widths,
            clipped.x,
            clipped.right(),
        );
        let rows = spans_touching(&self.row_starts, &self.row_heights, clipped.y, clipped.bottom());

        rows.flat_map(|row| {
            columns
                .clone()
                .map(move |column| row as u32 * self.columns() + column as u32)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_uniform_boundaries() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        assert_eq!(layout.grid_dimensions(), (2, 2));
        assert_eq!(layout.rectangle(1), Some(Rectangle::new(1, 160, 0, 160, 120)));
        assert_eq!(layout.rectangle(2), Some(Rectangle::new(2, 0, 120, 160, 120)));
        assert_eq!(layout.rectangle(4), None);
        assert!(layout.is_uniform());

        // 100 / 3 -> boundaries 0, 33, 66, 100
        let layout = TileLayout::uniform(100, 10, 1, 3).unwrap();
        assert_eq!(layout.column_widths(), &[33, 33, 34]);
    }

    #[test]
    fn test_uniform_rejects_degenerate() {
        assert_eq!(TileLayout::uniform(320, 240, 0, 2), Err(LayoutError::Empty));
        assert_eq!(TileLayout::uniform(2, 240, 1, 3), Err(LayoutError::Empty));
    }

    #[test]
    fn test_tile_for_point() {
        let layout = TileLayout::from_dimensions(vec![100, 220], vec![60, 180]).unwrap();
        assert_eq!(layout.tile_for_point(0, 0), Some(0));
        assert_eq!(layout.tile_for_point(99, 59), Some(0));
        assert_eq!(layout.tile_for_point(100, 59), Some(1));
        assert_eq!(layout.tile_for_point(100, 60), Some(3));
        assert_eq!(layout.tile_for_point(320, 0), None);
        assert!(!layout.is_uniform());
    }

    #[test]
    fn test_tiles_intersecting() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        assert_eq!(
            layout.tiles_intersecting(&Rectangle::new(0, 170, 10, 20, 20)),
            vec![1]
        );
        assert_eq!(
            layout.tiles_intersecting(&Rectangle::new(0, 150, 110, 20, 20)),
            vec![0, 1, 2, 3]
        );
        // right edge at 160 is exclusive
        assert_eq!(
            layout.tiles_intersecting(&Rectangle::new(0, 140, 0, 20, 10)),
            vec![0]
        );
        assert!(layout
            .tiles_intersecting(&Rectangle::new(0, 400, 0, 10, 10))
            .is_empty());
        assert!(layout
            .tiles_intersecting(&Rectangle::new(0, 10, 10, 0, 10))
            .is_empty());
    }

    #[test]
    fn test_full_grid_validates() {
        let layout = TileLayout::uniform(320, 240, 2, 3).unwrap();
        let rects = layout.rectangles();
        let rebuilt = TileLayout::from_rectangles(320, 240, &rects).unwrap();
        assert_eq!(rebuilt, layout);
    }

    #[test]
    fn test_missing_tile_is_a_gap() {
        let mut rects = TileLayout::uniform(320, 240, 2, 2).unwrap().rectangles();
        rects.remove(2);
        assert_eq!(
            TileLayout::from_rectangles(320, 240, &rects),
            Err(LayoutError::Gap { x: 0, y: 120 })
        );
    }

    #[test]
    fn test_shrunk_tile_is_a_gap() {
        let mut rects = TileLayout::uniform(320, 240, 2, 2).unwrap().rectangles();
        rects[3].width -= 1;
        assert_eq!(
            TileLayout::validate_rectangles(320, 240, &rects),
            Err(LayoutError::Gap { x: 319, y: 120 })
        );
    }

    #[test]
    fn test_overlap_and_bounds() {
        let mut rects = TileLayout::uniform(320, 240, 1, 2).unwrap().rectangles();
        rects[1].x -= 1;
        rects[1].width += 1;
        assert_eq!(
            TileLayout::validate_rectangles(320, 240, &rects),
            Err(LayoutError::Overlap { first: 0, second: 1 })
        );

        rects[1].width += 1;
        assert_matches!(
            TileLayout::validate_rectangles(320, 240, &rects),
            Err(LayoutError::OutOfBounds { tile: 1, .. })
        );
        assert_eq!(
            TileLayout::validate_rectangles(320, 240, &[]),
            Err(LayoutError::Empty)
        );
    }

    #[test]
    fn test_non_grid_rectangles() {
        // a full-height left tile beside two stacked right tiles
        let rects = [
            Rectangle::new(0, 0, 0, 100, 240),
            Rectangle::new(1, 100, 0, 220, 120),
            Rectangle::new(2, 100, 120, 220, 120),
        ];
        assert!(TileLayout::validate_rectangles(320, 240, &rects).is_ok());
        assert_matches!(
            TileLayout::from_rectangles(320, 240, &rects),
            Err(LayoutError::NotAGrid(_))
        );
    }

    #[test]
    fn test_serde_validates() {
        let layout = TileLayout::from_dimensions(vec![100, 220], vec![240]).unwrap();
        let json = serde_json::to_string(&layout).unwrap();
        assert_eq!(json, r#"{"column_widths":[100,220],"row_heights":[240]}"#);
        let back: TileLayout = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layout);

        assert!(serde_json::from_str::<TileLayout>(r#"{"column_widths":[0],"row_heights":[1]}"#)
            .is_err());
    }
}
