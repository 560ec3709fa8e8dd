//! Per-version layout manifests.

use super::TileLayout;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use panotile_common::{LayoutVersion, VideoGeometry};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A contiguous run of frames `[first_frame, last_frame)` stored under one layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSpan {
    pub first_frame: u32,
    pub last_frame: u32,
    pub layout: TileLayout,
    /// Stream index of tile 0; tile `t` is stored as stream `tile_base + t`.
    pub tile_base: u32,
}

impl LayoutSpan {
    pub fn contains(&self, frame: u32) -> bool {
        frame >= self.first_frame && frame < self.last_frame
    }

    pub fn frame_count(&self) -> u32 {
        self.last_frame - self.first_frame
    }

    pub fn stream_index(&self, tile: u32) -> u32 {
        self.tile_base + tile
    }
}

/// Everything needed to locate the tiles of one stored layout version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub version: LayoutVersion,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub gop_length: u32,
    pub spans: Vec<LayoutSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl VersionManifest {
    /// Manifest with spans laid out back to back from frame 0.
    pub fn new(
        version: LayoutVersion,
        geometry: VideoGeometry,
        gop_length: u32,
        spans: Vec<(u32, u32, TileLayout)>,
    ) -> Self {
        let mut tile_base = 0;
        let spans = spans
            .into_iter()
            .map(|(first_frame, last_frame, layout)| {
                let span = LayoutSpan {
                    first_frame,
                    last_frame,
                    tile_base,
                    layout,
                };
                tile_base += span.layout.tile_count();
                span
            })
            .collect();

        Self {
            version,
            width: geometry.width,
            height: geometry.height,
            frame_count: geometry.frame_count,
            gop_length,
            spans,
            source: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn geometry(&self) -> VideoGeometry {
        VideoGeometry {
            width: self.width,
            height: self.height,
            frame_count: self.frame_count,
        }
    }

    /// Number of stream files in this version.
    pub fn stream_count(&self) -> u32 {
        self.spans.iter().map(|s| s.layout.tile_count()).sum()
    }

    pub fn span_for_frame(&self, frame: u32) -> Option<&LayoutSpan> {
        let idx = self.spans.partition_point(|s| s.last_frame <= frame);
        self.spans.get(idx).filter(|s| s.contains(frame))
    }

    /// Check that spans cover `[0, frame_count)` contiguously, each layout
    /// covers the frame, and stream indices are assigned without holes.
    pub fn validate(&self) -> Result<()> {
        let corrupt = |reason: String| Error::CorruptVersion {
            entry: self
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            version: self.version,
            reason,
        };

        if self.spans.is_empty() {
            return Err(corrupt("manifest has no spans".into()));
        }

        let mut next_frame = 0;
        let mut next_tile = 0;
        for (i, span) in self.spans.iter().enumerate() {
            if span.first_frame != next_frame || span.last_frame <= span.first_frame {
                return Err(corrupt(format!(
                    "span {i} covers [{}, {}), expected to start at {next_frame}",
                    span.first_frame, span.last_frame
                )));
            }
            if span.layout.width() != self.width || span.layout.height() != self.height {
                return Err(corrupt(format!(
                    "span {i} layout is {}x{}, frame is {}x{}",
                    span.layout.width(),
                    span.layout.height(),
                    self.width,
                    self.height
                )));
            }
            if span.tile_base != next_tile {
                return Err(corrupt(format!(
                    "span {i} starts at stream {}, expected {next_tile}",
                    span.tile_base
                )));
            }
            next_frame = span.last_frame;
            next_tile += span.layout.tile_count();
        }

        if next_frame != self.frame_count {
            return Err(corrupt(format!(
                "spans end at frame {next_frame}, video has {}",
                self.frame_count
            )));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        let manifest: Self = serde_json::from_slice(&content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write atomically: temporary file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::invalid_argument(format!("{path:?} has no parent")))?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.flush()?;
        file.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn geometry() -> VideoGeometry {
        VideoGeometry {
            width: 320,
            height: 240,
            frame_count: 60,
        }
    }

    fn two_span_manifest() -> VersionManifest {
        VersionManifest::new(
            LayoutVersion::new(2),
            geometry(),
            30,
            vec![
                (0, 30, TileLayout::uniform(320, 240, 2, 2).unwrap()),
                (30, 60, TileLayout::uniform(320, 240, 1, 3).unwrap()),
            ],
        )
    }

    #[test]
    fn test_tile_bases_are_contiguous() {
        let manifest = two_span_manifest();
        assert_eq!(manifest.spans[0].tile_base, 0);
        assert_eq!(manifest.spans[1].tile_base, 4);
        assert_eq!(manifest.stream_count(), 7);
        assert_eq!(manifest.spans[1].stream_index(2), 6);
        manifest.validate().unwrap();
    }

    #[test]
    fn test_span_for_frame() {
        let manifest = two_span_manifest();
        assert_eq!(manifest.span_for_frame(0).map(|s| s.first_frame), Some(0));
        assert_eq!(manifest.span_for_frame(29).map(|s| s.first_frame), Some(0));
        assert_eq!(manifest.span_for_frame(30).map(|s| s.first_frame), Some(30));
        assert!(manifest.span_for_frame(60).is_none());
    }

    #[test]
    fn test_validate_rejects_holes() {
        let mut manifest = two_span_manifest();
        manifest.spans[1].first_frame = 31;
        assert_matches!(manifest.validate(), Err(Error::CorruptVersion { .. }));

        let mut manifest = two_span_manifest();
        manifest.frame_count = 90;
        assert_matches!(manifest.validate(), Err(Error::CorruptVersion { .. }));

        let mut manifest = two_span_manifest();
        manifest.spans[1].layout = TileLayout::uniform(640, 240, 1, 3).unwrap();
        assert_matches!(manifest.validate(), Err(Error::CorruptVersion { .. }));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2-layout.json");
        let manifest = two_span_manifest().with_source("/videos/pano.mp4");

        manifest.save(&path).unwrap();
        let loaded = VersionManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }
}
