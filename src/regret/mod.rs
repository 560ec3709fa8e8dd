//! Regret accounting for adaptive re-tiling.
//!
//! Every served query costs the pixels of the tiles it had to read. The part
//! of that cost not covered by the objects themselves is wasted; summed over
//! queries it is the regret of keeping the current layout. Once regret
//! exceeds the cost of re-encoding the whole video (scaled by a threshold)
//! a retile is triggered.

use crate::semantic::SemanticDataManager;
use crate::tiles::TileLocationProvider;
use crate::Result;
use panotile_common::{Rectangle, VideoGeometry};
use serde::Serialize;
use std::collections::BTreeSet;

pub const DEFAULT_REGRET_THRESHOLD: f64 = 1.0;

/// Where a video is in the retile cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetileState {
    Idle,
    Accumulating,
    RetileTriggered,
    Retiling,
}

impl std::fmt::Display for RetileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Accumulating => write!(f, "accumulating"),
            Self::RetileTriggered => write!(f, "retile_triggered"),
            Self::Retiling => write!(f, "retiling"),
        }
    }
}

/// Pixels a query read beyond the pixels of the objects it asked for.
///
/// Per frame: the area of every tile touched by a box, minus the area of the
/// boxes clipped to the frame. Never negative.
pub fn query_regret(provider: &TileLocationProvider, semantic: &SemanticDataManager) -> Result<u64> {
    let (width, height) = (provider.manifest().width, provider.manifest().height);
    let mut read = 0u64;
    let mut useful = 0u64;

    for &frame in semantic.ordered_frames() {
        let layout = provider.layout_for_frame(frame)?;
        let boxes = semantic.rectangles_for_frame(frame);

        let tiles: BTreeSet<u32> = boxes
            .iter()
            .flat_map(|b| layout.tiles_intersecting(b))
            .collect();
        read += tiles
            .iter()
            .filter_map(|&t| layout.rectangle(t))
            .map(|r| r.area())
            .sum::<u64>();
        useful += boxes
            .iter()
            .filter_map(|b| b.clip_to_frame(width, height))
            .map(|b| b.area())
            .sum::<u64>();
    }

    Ok(read.saturating_sub(useful))
}

/// Running regret of one video against its current layout.
#[derive(Debug, Clone)]
pub struct RegretAccumulator {
    video: String,
    metadata_identifier: String,
    geometry: VideoGeometry,
    threshold: f64,
    regret: u64,
    queries: u64,
    state: RetileState,
    history: Vec<(u32, Rectangle)>,
}

impl RegretAccumulator {
    pub fn new(
        video: impl Into<String>,
        metadata_identifier: impl Into<String>,
        geometry: VideoGeometry,
        threshold: f64,
    ) -> Self {
        Self {
            video: video.into(),
            metadata_identifier: metadata_identifier.into(),
            geometry,
            threshold,
            regret: 0,
            queries: 0,
            state: RetileState::Idle,
            history: Vec::new(),
        }
    }

    pub fn video(&self) -> &str {
        &self.video
    }

    pub fn metadata_identifier(&self) -> &str {
        &self.metadata_identifier
    }

    pub fn geometry(&self) -> VideoGeometry {
        self.geometry
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn regret(&self) -> u64 {
        self.regret
    }

    pub fn queries(&self) -> u64 {
        self.queries
    }

    pub fn state(&self) -> RetileState {
        self.state
    }

    /// Boxes of every query since the last publish.
    pub fn history(&self) -> &[(u32, Rectangle)] {
        &self.history
    }

    /// Pixel cost of re-encoding the video once.
    pub fn baseline(&self) -> u64 {
        self.geometry.total_pixels()
    }

    /// Regret above which a retile is triggered.
    pub fn trigger_level(&self) -> f64 {
        self.threshold * self.baseline() as f64
    }

    /// Account for one served query. Returns true when this query triggered
    /// a retile; it does so at most once until the retile completes.
    pub fn add_query(
        &mut self,
        provider: &TileLocationProvider,
        semantic: &SemanticDataManager,
    ) -> Result<bool> {
        let delta = query_regret(provider, semantic)?;
        Ok(self.add_regret(delta, semantic.rectangles().map(|(f, r)| (f, *r))))
    }

    /// Add `delta` wasted pixels and the query's boxes.
    pub fn add_regret(&mut self, delta: u64, boxes: impl IntoIterator<Item = (u32, Rectangle)>) -> bool {
        self.regret = self.regret.saturating_add(delta);
        self.queries += 1;
        self.history.extend(boxes);

        if self.state == RetileState::Idle {
            self.state = RetileState::Accumulating;
        }
        let triggered = self.state == RetileState::Accumulating
            && self.regret as f64 > self.trigger_level();
        if triggered {
            self.state = RetileState::RetileTriggered;
            tracing::info!(
                video = %self.video,
                regret = self.regret,
                trigger_level = self.trigger_level(),
                queries = self.queries,
                "Regret threshold exceeded, retile triggered"
            );
        } else {
            tracing::trace!(video = %self.video, delta, regret = self.regret, "Accumulated regret");
        }
        triggered
    }

    /// Move to `Retiling`. Returns false when a retile is already running.
    pub fn begin_retile(&mut self) -> bool {
        if self.state == RetileState::Retiling {
            return false;
        }
        self.state = RetileState::Retiling;
        true
    }

    /// Leave `Retiling`. Regret resets either way; the history is only
    /// dropped once a new layout has been published.
    pub fn finish_retile(&mut self, published: bool) {
        self.state = RetileState::Idle;
        self.regret = 0;
        self.queries = 0;
        if published {
            self.history.clear();
        }
    }

    /// Point the accumulator at a re-encoded video of a new size.
    pub fn set_geometry(&mut self, geometry: VideoGeometry) {
        self.geometry = geometry;
    }
}
