//! In-memory semantic index, loadable from and savable to JSON.

use super::SemanticIndex;
use crate::Result;
use panotile_common::Rectangle;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// One detection as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub video: String,
    pub label: String,
    pub frame: u32,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

type FrameBoxes = BTreeMap<u32, Vec<Rectangle>>;

/// Boxes keyed by (video, label), then frame.
#[derive(Debug, Default)]
pub struct InMemorySemanticIndex {
    boxes: RwLock<HashMap<(String, String), FrameBoxes>>,
    next_id: AtomicU32,
}

impl InMemorySemanticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = DetectionRecord>) -> Self {
        let index = Self::new();
        for record in records {
            index.insert_record(record);
        }
        index
    }

    /// Load a JSON array of [`DetectionRecord`]s.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        let records: Vec<DetectionRecord> = serde_json::from_slice(&content)?;
        let index = Self::from_records(records);
        tracing::info!(
            path = %path.display(),
            boxes = index.len(),
            "Loaded semantic index"
        );
        Ok(index)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &self.records())?;
        Ok(())
    }

    /// Every box as a record, ordered by video, label, frame.
    pub fn records(&self) -> Vec<DetectionRecord> {
        let boxes = self.boxes.read();
        let mut keys: Vec<_> = boxes.keys().collect();
        keys.sort();

        let mut records = Vec::new();
        for key in keys {
            for (&frame, rects) in &boxes[key] {
                records.extend(rects.iter().map(|r| DetectionRecord {
                    video: key.0.clone(),
                    label: key.1.clone(),
                    frame,
                    x1: r.x,
                    y1: r.y,
                    x2: r.right(),
                    y2: r.bottom(),
                    id: Some(r.id),
                }));
            }
        }
        records
    }

    /// Total number of boxes.
    pub fn len(&self) -> usize {
        self.boxes
            .read()
            .values()
            .flat_map(|frames| frames.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_record(&self, record: DetectionRecord) -> u32 {
        let id = match record.id {
            Some(id) => {
                self.next_id.fetch_max(id + 1, Ordering::Relaxed);
                id
            }
            None => self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        let rect = Rectangle::from_corners(id, record.x1, record.y1, record.x2, record.y2);
        self.boxes
            .write()
            .entry((record.video, record.label))
            .or_default()
            .entry(record.frame)
            .or_default()
            .push(rect);
        id
    }
}

impl SemanticIndex for InMemorySemanticIndex {
    fn bounding_boxes(&self, video: &str, label: &str, frame: u32) -> Vec<Rectangle> {
        self.boxes
            .read()
            .get(&(video.to_string(), label.to_string()))
            .and_then(|frames| frames.get(&frame))
            .cloned()
            .unwrap_or_default()
    }

    fn frames(&self, video: &str, label: &str) -> Vec<u32> {
        self.boxes
            .read()
            .get(&(video.to_string(), label.to_string()))
            .map(|frames| frames.keys().copied().collect())
            .unwrap_or_default()
    }

    fn labels(&self, video: &str) -> Vec<String> {
        let mut labels: Vec<String> = self
            .boxes
            .read()
            .keys()
            .filter(|(v, _)| v == video)
            .map(|(_, label)| label.clone())
            .collect();
        labels.sort();
        labels
    }

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
    ) -> u32 {
        self.insert_record(DetectionRecord {
            video: video.to_string(),
            label: label.to_string(),
            frame,
            x1,
            y1,
            x2,
            y2,
            id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_query() {
        let index = InMemorySemanticIndex::new();
        let a = index.add_metadata("pano", "car", 5, 170, 10, 190, 30);
        let b = index.add_metadata("pano", "car", 5, 10, 10, 20, 20);
        index.add_metadata("pano", "car", 2, 0, 0, 5, 5);
        index.add_metadata("pano", "bird", 7, 0, 0, 5, 5);
        assert_ne!(a, b);

        let boxes = index.bounding_boxes("pano", "car", 5);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0], Rectangle::new(a, 170, 10, 20, 20));
        assert_eq!(index.frames("pano", "car"), vec![2, 5]);
        assert_eq!(index.labels("pano"), vec!["bird", "car"]);
        assert!(index.bounding_boxes("pano", "car", 6).is_empty());
        assert!(index.frames("other", "car").is_empty());
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxes.json");
        std::fs::write(
            &path,
            r#"[
                {"video": "pano", "label": "car", "frame": 5, "x1": 170, "y1": 10, "x2": 190, "y2": 30},
                {"video": "pano", "label": "car", "frame": 6, "x1": 190, "y1": 30, "x2": 170, "y2": 10, "id": 40}
            ]"#,
        )
        .unwrap();

        let index = InMemorySemanticIndex::load_json(&path).unwrap();
        assert_eq!(
            index.bounding_boxes("pano", "car", 6),
            vec![Rectangle::new(40, 170, 10, 20, 20)]
        );
        // explicit ids push the counter past them
        assert!(index.add_metadata("pano", "car", 9, 0, 0, 1, 1) > 40);

        let saved = dir.path().join("saved.json");
        index.save_json(&saved).unwrap();
        let reloaded = InMemorySemanticIndex::load_json(&saved).unwrap();
        assert_eq!(reloaded.records(), index.records());
    }
}
