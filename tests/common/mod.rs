//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates a temporary catalog, an in-memory
//! semantic index, and a [`VideoManager`] backed by [`SynthEncoder`], a
//! [`TileEncoder`] that writes synthetic HEVC streams instead of running
//! ffmpeg.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use panotile::catalog::Catalog;
use panotile::config::Config;
use panotile::encode::{TileEncodeRequest, TileEncoder};
use panotile::semantic::{InMemorySemanticIndex, SemanticIndex};
use panotile::{Error, Result, VideoManager};
use panotile_bitstream::synth::{self, PpsBuilder};
use panotile_common::VideoGeometry;

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;
pub const FRAMES: u32 = 10;
pub const GOP: u32 = 5;

pub fn geometry() -> VideoGeometry {
    VideoGeometry {
        width: WIDTH,
        height: HEIGHT,
        frame_count: FRAMES,
    }
}

/// Writes one synthetic slice per picture for every tile.
pub struct SynthEncoder {
    geometry: VideoGeometry,
    fail: AtomicBool,
    tiles_written: AtomicUsize,
}

impl SynthEncoder {
    pub fn new(geometry: VideoGeometry) -> Self {
        Self {
            geometry,
            fail: AtomicBool::new(false),
            tiles_written: AtomicUsize::new(0),
        }
    }

    /// Make every following tile encode fail.
    pub fn fail_encodes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn tiles_written(&self) -> usize {
        self.tiles_written.load(Ordering::SeqCst)
    }
}

impl TileEncoder for SynthEncoder {
    fn probe(&self, _source: &Path) -> Result<VideoGeometry> {
        Ok(self.geometry)
    }

    fn encode_tiles(&self, request: &TileEncodeRequest) -> Result<()> {
        for (i, output) in request.outputs.iter().enumerate() {
            // fail after the first tile so cleanup has something to remove
            if i > 0 && self.fail.load(Ordering::SeqCst) {
                return Err(Error::tool_failed("ffmpeg", "synthetic encode failure"));
            }
            let stream = synth::tile_stream(
                request.frame_count() as usize,
                request.gop_length as usize,
                &PpsBuilder::new(0),
                output.rectangle.id as u8,
            );
            std::fs::write(&output.path, stream)?;
            self.tiles_written.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn encode_header(&self, _source: &Path, output: &Path) -> Result<()> {
        // a generous grid, rewritten down to the stored layout when stitching
        std::fs::write(output, synth::header_stream(&PpsBuilder::new(0).tiles(6, 6)))?;
        Ok(())
    }
}

/// Test harness wrapping a [`VideoManager`] over a temporary catalog.
pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub manager: VideoManager,
    pub index: Arc<InMemorySemanticIndex>,
    pub encoder: Arc<SynthEncoder>,
    pub source: PathBuf,
}

impl TestHarness {
    /// Harness with small tiles allowed, so fitted layouts fit a 320x240 frame.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.encoder.gop_length = GOP;
        config.retile.min_tile_width = 64;
        config.retile.min_tile_height = 64;
        config.retile.alignment = 64;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let catalog = Catalog::open(dir.path().join("catalog")).expect("failed to open catalog");
        let source = dir.path().join("source.mp4");
        std::fs::write(&source, b"not a real video").expect("failed to write source");

        let index = Arc::new(InMemorySemanticIndex::new());
        let encoder = Arc::new(SynthEncoder::new(geometry()));
        let manager = VideoManager::new(
            catalog,
            encoder.clone(),
            index.clone() as Arc<dyn SemanticIndex>,
            &config,
        );

        Self {
            dir,
            manager,
            index,
            encoder,
            source,
        }
    }

    /// Store the source as `name` under a uniform grid.
    pub fn store(&self, name: &str, rows: u32, columns: u32) {
        self.manager
            .store(name, &self.source, rows, columns)
            .expect("failed to store video");
    }

    /// Add a box given by its position and size.
    pub fn add_box(&self, video: &str, label: &str, frame: u32, x: u32, y: u32, w: u32, h: u32) -> u32 {
        self.index.add_metadata(video, label, frame, x, y, x + w, y + h)
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.dir.path().join("catalog")
    }
}
