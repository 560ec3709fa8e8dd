//! Access-unit and GOP indexing of an Annex B elementary stream.
//!
//! A picture starts at a slice whose first_slice_segment_in_pic_flag is set.
//! Non-VCL units seen before that slice (AUD, prefix SEI) belong to it;
//! suffix units (suffix SEI, end of sequence) directly after its last slice
//! close it.
//! VPS/SPS/PPS units are recorded separately, since an encoder run with
//! repeated headers emits them again before every keyframe.
//!
//! A GOP starts at every IRAP picture. Pictures before the first IRAP form
//! a leading GOP of their own.

use crate::{Error, Result};
use panotile_bitstream::nal::first_slice_segment_in_pic;
use panotile_bitstream::{split_nal_units, NalUnit};
use std::ops::Range;

/// One coded picture.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PictureEntry {
    /// Frame number within the stream (0-based).
    pub frame: u32,
    /// Whether the picture is IRAP.
    pub keyframe: bool,
    /// Indices into [`GopIndex::nal_units`].
    pub nal_range: Range<usize>,
    /// Number of slice segments in the picture.
    pub slice_count: u32,
}

/// A run of pictures starting at a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Gop {
    /// GOP index (0-based).
    pub index: u32,
    /// First frame in the GOP.
    pub first_frame: u32,
    /// End frame (exclusive).
    pub end_frame: u32,
}

impl Gop {
    pub fn frame_count(&self) -> u32 {
        self.end_frame - self.first_frame
    }

    pub fn contains(&self, frame: u32) -> bool {
        frame >= self.first_frame && frame < self.end_frame
    }

    pub fn frames(&self) -> Range<u32> {
        self.first_frame..self.end_frame
    }
}

/// Picture and GOP boundaries of one stream.
#[derive(Debug, Clone, Default)]
pub struct GopIndex {
    nal_units: Vec<NalUnit>,
    parameter_sets: Vec<usize>,
    pictures: Vec<PictureEntry>,
    gops: Vec<Gop>,
}

impl GopIndex {
    /// Index an Annex B byte stream.
    pub fn build(stream: &[u8]) -> Result<Self> {
        let nal_units = split_nal_units(stream)?;

        let mut parameter_sets = Vec::new();
        let mut pictures: Vec<PictureEntry> = Vec::new();
        let mut pending_start: Option<usize> = None;

        for (idx, unit) in nal_units.iter().enumerate() {
            if unit.nal_type.is_parameter_set() {
                parameter_sets.push(idx);
                continue;
            }

            if unit.nal_type.is_suffix() && pending_start.is_none() {
                if let Some(current) = pictures.last_mut().filter(|p| p.nal_range.end == idx) {
                    current.nal_range.end = idx + 1;
                    continue;
                }
            }

            if !unit.nal_type.is_vcl() {
                // prefix units attach to the picture that follows
                pending_start.get_or_insert(idx);
                continue;
            }

            let first_in_picture =
                first_slice_segment_in_pic(unit.data(stream)).unwrap_or(false);

            match pictures.last_mut() {
                Some(current) if !first_in_picture => {
                    current.nal_range.end = idx + 1;
                    current.slice_count += 1;
                    pending_start = None;
                }
                None if !first_in_picture => {
                    return Err(Error::invalid_stream(format!(
                        "slice at byte {} continues a picture that never started",
                        unit.start
                    )));
                }
                _ => {
                    let start = pending_start.take().unwrap_or(idx);
                    pictures.push(PictureEntry {
                        frame: pictures.len() as u32,
                        keyframe: unit.nal_type.is_irap(),
                        nal_range: start..idx + 1,
                        slice_count: 1,
                    });
                }
            }
        }

        let gops = group_gops(&pictures);
        tracing::trace!(
            nal_units = nal_units.len(),
            pictures = pictures.len(),
            gops = gops.len(),
            "Indexed elementary stream"
        );

        Ok(Self {
            nal_units,
            parameter_sets,
            pictures,
            gops,
        })
    }

    pub fn nal_units(&self) -> &[NalUnit] {
        &self.nal_units
    }

    /// VPS/SPS/PPS units, in stream order.
    pub fn parameter_sets(&self) -> impl Iterator<Item = &NalUnit> {
        self.parameter_sets.iter().map(|&idx| &self.nal_units[idx])
    }

    pub fn pictures(&self) -> &[PictureEntry] {
        &self.pictures
    }

    pub fn picture(&self, frame: u32) -> Option<&PictureEntry> {
        self.pictures.get(frame as usize)
    }

    /// NAL units of one picture, in stream order.
    pub fn picture_units(&self, picture: &PictureEntry) -> &[NalUnit] {
        &self.nal_units[picture.nal_range.clone()]
    }

    pub fn frame_count(&self) -> u32 {
        self.pictures.len() as u32
    }

    pub fn gops(&self) -> &[Gop] {
        &self.gops
    }

    pub fn gop_count(&self) -> u32 {
        self.gops.len() as u32
    }

    pub fn gop(&self, index: u32) -> Option<&Gop> {
        self.gops.get(index as usize)
    }

    /// GOP containing `frame`.
    pub fn gop_for_frame(&self, frame: u32) -> Option<&Gop> {
        let idx = self.gops.partition_point(|gop| gop.end_frame <= frame);
        self.gops.get(idx).filter(|gop| gop.contains(frame))
    }

    /// Keyframe flags for the frames of `gop`, used to compare GOP structure
    /// across tiles.
    pub fn keyframe_pattern(&self, gop: &Gop) -> Vec<bool> {
        self.pictures[gop.first_frame as usize..gop.end_frame as usize]
            .iter()
            .map(|p| p.keyframe)
            .collect()
    }

    /// Expand `frames` to every frame of each GOP they touch.
    ///
    /// Frames past the end of the stream are dropped. The result is sorted
    /// and free of duplicates.
    pub fn expand_to_gops(&self, frames: &[u32]) -> Vec<u32> {
        let mut touched: Vec<u32> = frames
            .iter()
            .filter_map(|&frame| self.gop_for_frame(frame).map(|gop| gop.index))
            .collect();
        touched.sort_unstable();
        touched.dedup();

        touched
            .into_iter()
            .filter_map(|index| self.gop(index))
            .flat_map(|gop| gop.frames())
            .collect()
    }
}

fn group_gops(pictures: &[PictureEntry]) -> Vec<Gop> {
    let mut gops: Vec<Gop> = Vec::new();
    for picture in pictures {
        match gops.last_mut() {
            Some(gop) if !picture.keyframe => gop.end_frame = picture.frame + 1,
            _ => gops.push(Gop {
                index: gops.len() as u32,
                first_frame: picture.frame,
                end_frame: picture.frame + 1,
            }),
        }
    }
    gops
}
