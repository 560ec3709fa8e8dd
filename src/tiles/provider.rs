//! Resolving (frame, tile) to files on disk.

use super::{LayoutSpan, TileLayout, VersionManifest};
use crate::{Error, Result};
use panotile_common::{paths, LayoutVersion, Rectangle};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where one tile of one span lives and which of its frames a query needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileInformation {
    pub path: PathBuf,
    pub tile: u32,
    pub width: u32,
    pub height: u32,
    /// Global frame numbers to read, ascending.
    pub frames: Vec<u32>,
    /// Global frame number of the file's first picture.
    pub frame_offset: u32,
    pub rectangle: Rectangle,
}

impl TileInformation {
    /// Sort key: height, then width, ascending.
    pub fn size_key(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Frame numbers relative to the start of the tile file.
    pub fn local_frames(&self) -> impl Iterator<Item = u32> + '_ {
        self.frames.iter().map(move |f| f - self.frame_offset)
    }
}

/// Lookup from frame and tile index to the tile's file for one layout version.
#[derive(Debug, Clone)]
pub struct TileLocationProvider {
    directory: PathBuf,
    manifest: VersionManifest,
}

impl TileLocationProvider {
    pub fn new(directory: impl Into<PathBuf>, manifest: VersionManifest) -> Result<Self> {
        manifest.validate()?;
        Ok(Self {
            directory: directory.into(),
            manifest,
        })
    }

    /// Load the manifest of `version` from an entry directory.
    pub fn load(directory: &Path, version: LayoutVersion) -> Result<Self> {
        let manifest = VersionManifest::load(&paths::layout_filename(directory, version))?;
        if manifest.version != version {
            return Err(Error::CorruptVersion {
                entry: directory.display().to_string(),
                version,
                reason: format!("manifest records version {}", manifest.version),
            });
        }
        Self::new(directory, manifest)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn version(&self) -> LayoutVersion {
        self.manifest.version
    }

    pub fn manifest(&self) -> &VersionManifest {
        &self.manifest
    }

    pub fn frame_count(&self) -> u32 {
        self.manifest.frame_count
    }

    pub fn span_for_frame(&self, frame: u32) -> Result<&LayoutSpan> {
        self.manifest
            .span_for_frame(frame)
            .ok_or(Error::FrameOutOfRange {
                frame,
                frame_count: self.manifest.frame_count,
            })
    }

    pub fn layout_for_frame(&self, frame: u32) -> Result<&TileLayout> {
        self.span_for_frame(frame).map(|span| &span.layout)
    }

    /// Path of the stream holding `tile` at `frame`.
    pub fn location_of_tile_for_frame(&self, tile: u32, frame: u32) -> Result<PathBuf> {
        let span = self.span_for_frame(frame)?;
        if tile >= span.layout.tile_count() {
            return Err(Error::invalid_argument(format!(
                "tile {tile} out of range for a {}-tile layout",
                span.layout.tile_count()
            )));
        }
        Ok(paths::stream_filename(
            &self.directory,
            self.manifest.version,
            span.stream_index(tile),
        ))
    }

    /// Descriptor for `tile` at `frame`, with an empty frame list.
    pub fn tile_information(&self, tile: u32, frame: u32) -> Result<TileInformation> {
        let path = self.location_of_tile_for_frame(tile, frame)?;
        let span = self.span_for_frame(frame)?;
        let rectangle = span
            .layout
            .rectangle(tile)
            .ok_or_else(|| Error::invalid_argument(format!("tile {tile} out of range")))?;
        Ok(TileInformation {
            path,
            tile,
            width: rectangle.width,
            height: rectangle.height,
            frames: Vec::new(),
            frame_offset: span.first_frame,
            rectangle,
        })
    }

    /// Full-frame parameter-set header for the version holding `frame`.
    pub fn metadata_path_for_frame(&self, frame: u32) -> Result<PathBuf> {
        self.span_for_frame(frame)?;
        Ok(paths::metadata_filename(&self.directory, self.manifest.version))
    }
}
