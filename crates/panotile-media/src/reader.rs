//! Frame-addressed reading of a tile stream.

use crate::gop::{Gop, GopIndex};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use panotile_bitstream::{NalUnit, NalUnitType, START_CODE};
use std::fs;
use std::path::{Path, PathBuf};

/// One NAL unit of a picture, without its start code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedNal {
    pub nal_type: NalUnitType,
    pub data: Bytes,
}

/// The NAL units of one coded picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPicture {
    pub frame: u32,
    pub keyframe: bool,
    pub nals: Vec<EncodedNal>,
}

impl EncodedPicture {
    /// Slice segments only.
    pub fn slices(&self) -> impl Iterator<Item = &EncodedNal> {
        self.nals.iter().filter(|nal| nal.nal_type.is_vcl())
    }
}

/// Reader over one tile stream held in memory.
///
/// The file is read once on open; every accessor afterwards hands out
/// zero-copy [`Bytes`] slices of it.
#[derive(Debug, Clone)]
pub struct EncodedFrameReader {
    path: Option<PathBuf>,
    data: Bytes,
    index: GopIndex,
}

impl EncodedFrameReader {
    /// Read and index the stream at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = Bytes::from(fs::read(path)?);
        let mut reader = Self::from_bytes(data)?;
        reader.path = Some(path.to_path_buf());
        tracing::debug!(
            path = %path.display(),
            frames = reader.frame_count(),
            gops = reader.index.gop_count(),
            "Opened tile stream"
        );
        Ok(reader)
    }

    /// Index a stream already in memory.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let index = GopIndex::build(&data)?;
        Ok(Self {
            path: None,
            data,
            index,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn index(&self) -> &GopIndex {
        &self.index
    }

    pub fn frame_count(&self) -> u32 {
        self.index.frame_count()
    }

    /// Size of the stream in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn gops(&self) -> &[Gop] {
        self.index.gops()
    }

    pub fn gop_for_frame(&self, frame: u32) -> Option<&Gop> {
        self.index.gop_for_frame(frame)
    }

    fn nal(&self, unit: &NalUnit) -> EncodedNal {
        EncodedNal {
            nal_type: unit.nal_type,
            data: self.data.slice(unit.start..unit.end),
        }
    }

    /// VPS/SPS/PPS units, deduplicated by content in first-seen order.
    pub fn parameter_sets(&self) -> Vec<EncodedNal> {
        let mut seen: Vec<EncodedNal> = Vec::new();
        for unit in self.index.parameter_sets() {
            let nal = self.nal(unit);
            if !seen.iter().any(|s| s.data == nal.data) {
                seen.push(nal);
            }
        }
        seen
    }

    /// The picture at `frame`.
    pub fn picture(&self, frame: u32) -> Result<EncodedPicture> {
        let entry = self.index.picture(frame).ok_or(Error::FrameOutOfRange {
            frame,
            count: self.frame_count(),
        })?;
        Ok(EncodedPicture {
            frame,
            keyframe: entry.keyframe,
            nals: self
                .index
                .picture_units(entry)
                .iter()
                .map(|unit| self.nal(unit))
                .collect(),
        })
    }

    /// Every picture of GOP `index`.
    pub fn read_gop(&self, index: u32) -> Result<Vec<EncodedPicture>> {
        let gop = self.index.gop(index).ok_or(Error::InvalidGopIndex {
            index,
            count: self.index.gop_count(),
        })?;
        gop.frames().map(|frame| self.picture(frame)).collect()
    }

    /// Concatenate the pictures at `frames` into a decodable Annex B packet.
    ///
    /// Parameter sets are emitted once in front. `frames` should start on a
    /// keyframe for the packet to decode on its own.
    pub fn read_frames(&self, frames: &[u32]) -> Result<Bytes> {
        let mut out = BytesMut::new();
        for nal in self.parameter_sets() {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(&nal.data);
        }
        for &frame in frames {
            for nal in self.picture(frame)?.nals {
                out.extend_from_slice(&START_CODE);
                out.extend_from_slice(&nal.data);
            }
        }
        Ok(out.freeze())
    }

    /// Bytes covered by the pictures at `frames`, markers included.
    pub fn byte_size(&self, frames: &[u32]) -> u64 {
        frames
            .iter()
            .filter_map(|&frame| self.index.picture(frame))
            .flat_map(|entry| self.index.picture_units(entry))
            .map(|unit| (unit.end - unit.marker_start) as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panotile_bitstream::synth::{self, PpsBuilder};
    use panotile_bitstream::split_nal_units;

    fn reader(frames: usize, gop: usize) -> EncodedFrameReader {
        let stream = synth::tile_stream(frames, gop, &PpsBuilder::new(0), 7);
        EncodedFrameReader::from_bytes(Bytes::from(stream)).unwrap()
    }

    #[test]
    fn test_picture_access() {
        let reader = reader(4, 2);
        let picture = reader.picture(2).unwrap();
        assert!(picture.keyframe);
        assert_eq!(picture.slices().count(), 1);
        assert_eq!(picture.nals[0].nal_type, NalUnitType::IdrWRadl);

        assert!(matches!(
            reader.picture(4),
            Err(Error::FrameOutOfRange { frame: 4, count: 4 })
        ));
    }

    #[test]
    fn test_read_gop() {
        let reader = reader(5, 2);
        let gop = reader.read_gop(1).unwrap();
        assert_eq!(gop.iter().map(|p| p.frame).collect::<Vec<_>>(), vec![2, 3]);
        assert!(matches!(
            reader.read_gop(3),
            Err(Error::InvalidGopIndex { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_read_frames_prepends_parameter_sets() {
        let reader = reader(4, 2);
        let packet = reader.read_frames(&[2, 3]).unwrap();
        let units = split_nal_units(&packet).unwrap();
        let types: Vec<_> = units.iter().map(|u| u.nal_type).collect();
        assert_eq!(
            types,
            vec![
                NalUnitType::VpsNut,
                NalUnitType::SpsNut,
                NalUnitType::PpsNut,
                NalUnitType::IdrWRadl,
                NalUnitType::TrailR,
            ]
        );
    }

    #[test]
    fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-0-stream.mp4");
        std::fs::write(&path, synth::tile_stream(3, 3, &PpsBuilder::new(0), 1)).unwrap();

        let reader = EncodedFrameReader::open(&path).unwrap();
        assert_eq!(reader.path(), Some(path.as_path()));
        assert_eq!(reader.frame_count(), 3);
        assert!(reader.byte_size(&[0, 1, 2]) > 0);
        assert!(reader.byte_size(&[0]) < reader.byte_size(&[0, 1]));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            EncodedFrameReader::open("/nonexistent/0-stream.mp4"),
            Err(Error::Io(_))
        ));
    }
}
