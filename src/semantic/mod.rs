//! Object bounding boxes and query selection over them.
//!
//! A [`SemanticIndex`] answers "which boxes carry label L in frame F of
//! video V". [`SemanticDataManager`] resolves one query against an index
//! into the ordered frame list and per-frame boxes the scan operators walk.

mod memory;

pub use memory::{DetectionRecord, InMemorySemanticIndex};

use panotile_common::Rectangle;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Source of labelled object boxes.
pub trait SemanticIndex: Send + Sync {
    /// Boxes for `label` in `frame`, each carrying its object id.
    fn bounding_boxes(&self, video: &str, label: &str, frame: u32) -> Vec<Rectangle>;

    /// Distinct frames holding at least one `label` box, ascending.
    fn frames(&self, video: &str, label: &str) -> Vec<u32>;

    /// Labels present for `video`, sorted.
    fn labels(&self, video: &str) -> Vec<String>;

    /// Record a box given by its corners and return the assigned object id.
    #[allow(clippy::too_many_arguments)]
    fn add_metadata(
        &self,
        video: &str,
        label: &str,
        frame: u32,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
    ) -> u32;
}

/// Which labels a query matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSelection {
    Single(String),
    /// Frames with at least one of the labels.
    Any(Vec<String>),
    /// Frames with every one of the labels.
    All(Vec<String>),
}

impl MetadataSelection {
    pub fn labels(&self) -> &[String] {
        match self {
            Self::Single(label) => std::slice::from_ref(label),
            Self::Any(labels) | Self::All(labels) => labels,
        }
    }
}

impl From<&str> for MetadataSelection {
    fn from(label: &str) -> Self {
        Self::Single(label.to_string())
    }
}

/// Which frames a query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemporalSelection {
    #[default]
    None,
    /// Frames in `[first, last)`.
    Range { first: u32, last: u32 },
    Frame(u32),
}

impl TemporalSelection {
    pub fn contains(&self, frame: u32) -> bool {
        match *self {
            Self::None => true,
            Self::Range { first, last } => frame >= first && frame < last,
            Self::Frame(f) => frame == f,
        }
    }
}

/// Boxes of one query, resolved frame by frame.
#[derive(Clone)]
pub struct SemanticDataManager {
    metadata_identifier: String,
    selection: MetadataSelection,
    temporal: TemporalSelection,
    rectangles: BTreeMap<u32, Vec<Rectangle>>,
    ordered_frames: Vec<u32>,
}

impl SemanticDataManager {
    pub fn new(
        index: Arc<dyn SemanticIndex>,
        metadata_identifier: impl Into<String>,
        selection: MetadataSelection,
        temporal: TemporalSelection,
    ) -> Self {
        let metadata_identifier = metadata_identifier.into();
        let labels = selection.labels();

        let per_label: Vec<BTreeSet<u32>> = labels
            .iter()
            .map(|label| {
                index
                    .frames(&metadata_identifier, label)
                    .into_iter()
                    .filter(|&f| temporal.contains(f))
                    .collect()
            })
            .collect();

        let frames: BTreeSet<u32> = match &selection {
            MetadataSelection::All(_) => {
                let mut sets = per_label.iter();
                let first = sets.next().cloned().unwrap_or_default();
                sets.fold(first, |acc, set| acc.intersection(set).copied().collect())
            }
            _ => per_label.iter().flatten().copied().collect(),
        };

        let mut rectangles = BTreeMap::new();
        for &frame in &frames {
            let boxes: Vec<Rectangle> = labels
                .iter()
                .flat_map(|label| index.bounding_boxes(&metadata_identifier, label, frame))
                .collect();
            rectangles.insert(frame, boxes);
        }

        tracing::debug!(
            metadata = %metadata_identifier,
            labels = ?labels,
            frames = rectangles.len(),
            "Resolved semantic selection"
        );

        Self {
            ordered_frames: rectangles.keys().copied().collect(),
            metadata_identifier,
            selection,
            temporal,
            rectangles,
        }
    }

    pub fn metadata_identifier(&self) -> &str {
        &self.metadata_identifier
    }

    pub fn selection(&self) -> &MetadataSelection {
        &self.selection
    }

    pub fn temporal(&self) -> TemporalSelection {
        self.temporal
    }

    /// Distinct matching frames, ascending.
    pub fn ordered_frames(&self) -> &[u32] {
        &self.ordered_frames
    }

    pub fn rectangles_for_frame(&self, frame: u32) -> &[Rectangle] {
        self.rectangles.get(&frame).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every (frame, box) pair, in frame order.
    pub fn rectangles(&self) -> impl Iterator<Item = (u32, &Rectangle)> {
        self.rectangles
            .iter()
            .flat_map(|(&frame, boxes)| boxes.iter().map(move |b| (frame, b)))
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_frames.is_empty()
    }
}

impl std::fmt::Debug for SemanticDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticDataManager")
            .field("metadata_identifier", &self.metadata_identifier)
            .field("selection", &self.selection)
            .field("temporal", &self.temporal)
            .field("frames", &self.ordered_frames.len())
            .finish()
    }
}
