//! Core type definitions shared by the engine, config, and CLI.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a selection is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectStrategy {
    /// Per-tile data for tiles holding objects; each object must fit in one tile.
    #[default]
    Objects,
    /// Per-tile data for every tile touched by an object.
    Tiles,
    /// Whole frames stitched from all tiles.
    Frames,
}

impl fmt::Display for SelectStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Objects => write!(f, "objects"),
            Self::Tiles => write!(f, "tiles"),
            Self::Frames => write!(f, "frames"),
        }
    }
}

impl std::str::FromStr for SelectStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "objects" => Ok(Self::Objects),
            "tiles" => Ok(Self::Tiles),
            "frames" => Ok(Self::Frames),
            _ => Err(format!("Unknown select strategy: {s}")),
        }
    }
}

/// Frame dimensions and length of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
}

impl VideoGeometry {
    /// Pixels per frame.
    pub fn frame_area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Pixels across every frame of the video.
    pub fn total_pixels(&self) -> u64 {
        self.frame_area() * u64::from(self.frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_strategy_roundtrip() {
        for strategy in [
            SelectStrategy::Objects,
            SelectStrategy::Tiles,
            SelectStrategy::Frames,
        ] {
            let parsed: SelectStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert!("pixels".parse::<SelectStrategy>().is_err());
        assert_eq!("FRAMES".parse::<SelectStrategy>(), Ok(SelectStrategy::Frames));
    }

    #[test]
    fn test_select_strategy_serde() {
        let json = serde_json::to_string(&SelectStrategy::Tiles).unwrap();
        assert_eq!(json, "\"tiles\"");
    }

    #[test]
    fn test_geometry_areas() {
        let g = VideoGeometry {
            width: 320,
            height: 240,
            frame_count: 10,
        };
        assert_eq!(g.frame_area(), 76_800);
        assert_eq!(g.total_pixels(), 768_000);
    }
}
