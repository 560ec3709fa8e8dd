use crate::operators::ScanOptions;
use crate::regret::DEFAULT_REGRET_THRESHOLD;
use crate::tiles::fit::{DEFAULT_ALIGNMENT, DEFAULT_MIN_TILE_HEIGHT, DEFAULT_MIN_TILE_WIDTH};
use crate::tiles::LayoutFitter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub retile: RetileConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub semantic_index: SemanticIndexConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Directory holding one subdirectory per stored video
    #[serde(default = "default_catalog_root")]
    pub root: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: default_catalog_root(),
        }
    }
}

fn default_catalog_root() -> PathBuf {
    PathBuf::from("./catalog")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Extend partial GOP reads to whole GOPs
    #[serde(default = "default_true")]
    pub read_entire_gops: bool,

    /// Skip unreadable tile files instead of failing the query
    #[serde(default)]
    pub allow_degraded: bool,

    /// Emit smaller tiles first
    #[serde(default = "default_true")]
    pub sort_by_size: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            read_entire_gops: true,
            allow_degraded: false,
            sort_by_size: true,
        }
    }
}

impl ScanConfig {
    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            read_entire_gops: self.read_entire_gops,
            require_single_tile_objects: false,
            allow_degraded: self.allow_degraded,
            sort_by_size: self.sort_by_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetileConfig {
    /// Retile in the background as soon as regret crosses the threshold
    #[serde(default)]
    pub automatic: bool,

    /// Regret, in multiples of the whole-video pixel count, that triggers a retile
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_min_tile_width")]
    pub min_tile_width: u32,

    #[serde(default = "default_min_tile_height")]
    pub min_tile_height: u32,

    /// Tile boundaries are multiples of this (the encoder's CTB size)
    #[serde(default = "default_alignment")]
    pub alignment: u32,
}

impl Default for RetileConfig {
    fn default() -> Self {
        Self {
            automatic: false,
            threshold: default_threshold(),
            min_tile_width: default_min_tile_width(),
            min_tile_height: default_min_tile_height(),
            alignment: default_alignment(),
        }
    }
}

impl RetileConfig {
    pub fn fitter(&self) -> LayoutFitter {
        LayoutFitter::new(self.min_tile_width, self.min_tile_height).with_alignment(self.alignment)
    }
}

fn default_threshold() -> f64 {
    DEFAULT_REGRET_THRESHOLD
}

fn default_min_tile_width() -> u32 {
    DEFAULT_MIN_TILE_WIDTH
}

fn default_min_tile_height() -> u32 {
    DEFAULT_MIN_TILE_HEIGHT
}

fn default_alignment() -> u32 {
    DEFAULT_ALIGNMENT
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    /// Custom path to ffmpeg binary
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Custom path to ffprobe binary
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    #[serde(default = "default_codec")]
    pub codec: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant rate factor
    #[serde(default = "default_quality")]
    pub quality: u32,

    /// Frames between keyframes in every tile stream
    #[serde(default = "default_gop_length")]
    pub gop_length: u32,

    /// Extra codec parameters, appended to the codec's params option
    #[serde(default)]
    pub codec_params: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            codec: default_codec(),
            preset: default_preset(),
            quality: default_quality(),
            gop_length: default_gop_length(),
            codec_params: None,
        }
    }
}

fn default_codec() -> String {
    "libx265".to_string()
}

fn default_preset() -> String {
    "fast".to_string()
}

fn default_quality() -> u32 {
    28
}

fn default_gop_length() -> u32 {
    30
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SemanticIndexConfig {
    /// JSON file of detections loaded at startup
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
