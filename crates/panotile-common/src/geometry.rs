//! Axis-aligned rectangles in luma-sample coordinates.
//!
//! The same type describes tile regions and object bounding boxes. For
//! bounding boxes `id` carries the object identifier from the semantic
//! index; for tiles it is the tile index.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle with a half-open extent `[x, x + width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn new(id: u32, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            id,
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rectangle from its top-left and bottom-right corners.
    ///
    /// Corners may be given in either order.
    ///
    /// # Examples
    ///
    /// ```
    /// use panotile_common::Rectangle;
    ///
    /// let r = Rectangle::from_corners(1, 5, 5, 20, 100);
    /// assert_eq!((r.x, r.y, r.width, r.height), (5, 5, 15, 95));
    /// ```
    pub fn from_corners(id: u32, x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));
        Self::new(id, left, top, right - left, bottom - top)
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the two rectangles share at least one sample.
    pub fn intersects(&self, other: &Rectangle) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// The shared region of two rectangles, carrying `self.id`.
    pub fn overlap(&self, other: &Rectangle) -> Option<Rectangle> {
        if !self.intersects(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Some(Rectangle::new(self.id, x, y, right - x, bottom - y))
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rectangle) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Clip to a `width` x `height` frame anchored at the origin.
    pub fn clip_to_frame(&self, width: u32, height: u32) -> Option<Rectangle> {
        self.overlap(&Rectangle::new(self.id, 0, 0, width, height))
    }

    /// Smallest rectangle covering both, carrying `self.id`.
    pub fn union_bounds(&self, other: &Rectangle) -> Rectangle {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rectangle::new(self.id, x, y, right - x, bottom - y)
    }
}

impl std::fmt::Display for Rectangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {}x{}+{}+{}",
            self.id, self.width, self.height, self.x, self.y
        )
    }
}
