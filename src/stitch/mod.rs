//! Merging independently encoded tile streams into one full-frame stream.
//!
//! Every tile of a layout is encoded as its own HEVC stream. To serve whole
//! frames, one GOP of each tile is combined into a single bitstream: the
//! parameter sets of the full-frame header (or of tile 0) are emitted once,
//! with the PPS rewritten to describe the layout's tile grid (explicit sizes
//! in CTBs when the layout is not uniform), followed by
//! the slices of every tile in row-major order, picture by picture.

use crate::tiles::TileLayout;
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use panotile_bitstream::{NalUnitType, ParameterSet, SequenceParameterSet, SliceHeader, START_CODE};
use panotile_media::{EncodedFrameReader, EncodedNal};

/// One stitched GOP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GopReaderPacket {
    pub gop: u32,
    /// First frame, in the numbering of the tile streams.
    pub first_frame: u32,
    pub frame_count: u32,
    /// Slice segments across all tiles and pictures.
    pub slice_count: u32,
    pub data: Bytes,
}

/// Column widths and row heights of `layout` in CTBs, last column and row
/// excluded, using the CTB size of the first SPS in `parameter_sets`.
fn explicit_sizes(layout: &TileLayout, parameter_sets: &[EncodedNal]) -> Result<(Vec<u32>, Vec<u32>)> {
    let sps = parameter_sets
        .iter()
        .find(|nal| nal.nal_type == NalUnitType::SpsNut)
        .ok_or_else(|| panotile_media::Error::invalid_stream("no SPS among the stitch parameter sets"))?;
    let ctb = SequenceParameterSet::parse(&sps.data)?.ctb_size();

    let in_ctbs = |sizes: &[u32]| -> Result<Vec<u32>> {
        let signalled = &sizes[..sizes.len().saturating_sub(1)];
        signalled
            .iter()
            .map(|&size| {
                if size % ctb == 0 {
                    Ok(size / ctb)
                } else {
                    Err(Error::invalid_argument(format!(
                        "tile size {size} is not a multiple of the {ctb}-sample CTB"
                    )))
                }
            })
            .collect()
    };
    Ok((in_ctbs(layout.column_widths())?, in_ctbs(layout.row_heights())?))
}

/// Rewritten parameter sets for one layout, reusable across GOPs.
#[derive(Debug, Clone)]
pub struct StitchContext {
    rows: u32,
    columns: u32,
    pps_id: u32,
    parameter_sets: Bytes,
}

impl StitchContext {
    /// Build from explicit parameter sets.
    ///
    /// The first PPS is kept and rewritten; any further PPS is dropped.
    /// `pps_id` overrides the id slices are pointed at, which otherwise is
    /// the kept PPS's own.
    pub fn new(layout: &TileLayout, parameter_sets: &[EncodedNal], pps_id: Option<u32>) -> Result<Self> {
        let (rows, columns) = layout.grid_dimensions();
        let explicit = if layout.is_uniform() {
            None
        } else {
            Some(explicit_sizes(layout, parameter_sets)?)
        };

        let mut out = BytesMut::new();
        let mut shared_id = None;
        for nal in parameter_sets {
            match nal.nal_type {
                NalUnitType::PpsNut if shared_id.is_none() => {
                    let mut pps = ParameterSet::parse(&nal.data)?;
                    if let Some(id) = pps_id {
                        pps.set_parameter_set_id(id)?;
                    }
                    match &explicit {
                        Some((widths, heights)) => {
                            pps.set_explicit_tile_spacing(widths, heights, false)?
                        }
                        None => pps.set_tile_dimensions(rows, columns, false)?,
                    }
                    shared_id = Some(pps.parameter_set_id());
                    out.extend_from_slice(pps.bytes());
                }
                NalUnitType::PpsNut => {
                    tracing::trace!("Dropping additional PPS");
                }
                _ => {
                    out.extend_from_slice(&START_CODE);
                    out.extend_from_slice(&nal.data);
                }
            }
        }

        let pps_id = shared_id.ok_or_else(|| {
            panotile_media::Error::invalid_stream("no PPS among the stitch parameter sets")
        })?;

        Ok(Self {
            rows,
            columns,
            pps_id,
            parameter_sets: out.freeze(),
        })
    }

    /// Parameter sets come from `header` when given, otherwise from tile 0.
    pub fn from_tiles(
        layout: &TileLayout,
        header: Option<&EncodedFrameReader>,
        tiles: &[EncodedFrameReader],
    ) -> Result<Self> {
        let source = match header {
            Some(header) => header,
            None => tiles
                .first()
                .ok_or_else(|| Error::invalid_argument("no tiles to stitch"))?,
        };
        Self::new(layout, &source.parameter_sets(), None)
    }

    /// The PPS id every emitted slice refers to.
    pub fn parameter_set_id(&self) -> u32 {
        self.pps_id
    }

    pub fn grid_dimensions(&self) -> (u32, u32) {
        (self.rows, self.columns)
    }

    /// The rewritten parameter sets, framed.
    pub fn parameter_sets(&self) -> &Bytes {
        &self.parameter_sets
    }

    /// Stitch GOP `gop` of every tile, given in tile order.
    ///
    /// All tiles must agree with tile 0 on picture count and keyframe
    /// positions within the GOP.
    pub fn stitch_gop(&self, tiles: &[EncodedFrameReader], gop: u32) -> Result<GopReaderPacket> {
        let expected = self.rows * self.columns;
        if tiles.len() != expected as usize {
            return Err(Error::invalid_argument(format!(
                "{} tile streams for a {}x{} grid",
                tiles.len(),
                self.rows,
                self.columns
            )));
        }

        let reference_index = tiles[0].index();
        let reference = *reference_index.gop(gop).ok_or(panotile_media::Error::InvalidGopIndex {
            index: gop,
            count: reference_index.gop_count(),
        })?;
        let reference_pattern = reference_index.keyframe_pattern(&reference);

        let mut starts = Vec::with_capacity(tiles.len());
        starts.push(reference.first_frame);
        for (tile, reader) in tiles.iter().enumerate().skip(1) {
            let tile = tile as u32;
            let index = reader.index();
            let Some(other) = index.gop(gop) else {
                return Err(Error::GopStructureMismatch {
                    gop,
                    tile,
                    detail: format!("stream has only {} GOPs", index.gop_count()),
                });
            };
            if other.frame_count() != reference.frame_count() {
                return Err(Error::GopStructureMismatch {
                    gop,
                    tile,
                    detail: format!(
                        "{} pictures, expected {}",
                        other.frame_count(),
                        reference.frame_count()
                    ),
                });
            }
            if index.keyframe_pattern(other) != reference_pattern {
                return Err(Error::GopStructureMismatch {
                    gop,
                    tile,
                    detail: "keyframe positions differ".to_string(),
                });
            }
            starts.push(other.first_frame);
        }

        let mut out = BytesMut::from(&self.parameter_sets[..]);
        let mut slice_count = 0;
        for offset in 0..reference.frame_count() {
            let pictures = tiles
                .iter()
                .zip(&starts)
                .map(|(reader, &start)| reader.picture(start + offset))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // non-VCL units of tile 0 are carried once per picture, around the slices
            let (suffix, prefix): (Vec<&EncodedNal>, Vec<&EncodedNal>) = pictures[0]
                .nals
                .iter()
                .filter(|nal| !nal.nal_type.is_vcl())
                .partition(|nal| nal.nal_type.is_suffix());

            for nal in prefix {
                out.extend_from_slice(&START_CODE);
                out.extend_from_slice(&nal.data);
            }
            for picture in &pictures {
                for nal in picture.nals.iter().filter(|nal| nal.nal_type.is_vcl()) {
                    self.emit_slice(&mut out, nal)?;
                    slice_count += 1;
                }
            }
            for nal in suffix {
                out.extend_from_slice(&START_CODE);
                out.extend_from_slice(&nal.data);
            }
        }

        tracing::trace!(
            gop,
            frames = reference.frame_count(),
            slices = slice_count,
            bytes = out.len(),
            "Stitched GOP"
        );

        Ok(GopReaderPacket {
            gop,
            first_frame: reference.first_frame,
            frame_count: reference.frame_count(),
            slice_count,
            data: out.freeze(),
        })
    }

    fn emit_slice(&self, out: &mut BytesMut, nal: &EncodedNal) -> Result<()> {
        let mut slice = SliceHeader::parse(&nal.data)?;
        if slice.slice_pic_parameter_set_id() == self.pps_id {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(&nal.data);
        } else {
            slice.set_slice_pic_parameter_set_id(self.pps_id)?;
            out.extend_from_slice(&slice.bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use panotile_bitstream::synth::{self, PpsBuilder};
    use panotile_bitstream::{split_nal_units, BitstreamError};

    fn tiles(gop_lengths: [usize; 4]) -> Vec<EncodedFrameReader> {
        gop_lengths
            .iter()
            .enumerate()
            .map(|(t, &gop)| {
                let stream = synth::tile_stream(6, gop, &PpsBuilder::new(1), t as u8);
                EncodedFrameReader::from_bytes(Bytes::from(stream)).unwrap()
            })
            .collect()
    }

    fn header() -> EncodedFrameReader {
        let stream = synth::header_stream(&PpsBuilder::new(2).tiles(4, 4));
        EncodedFrameReader::from_bytes(Bytes::from(stream)).unwrap()
    }

    #[test]
    fn test_stitch_gop_uses_header_pps() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        let tiles = tiles([3; 4]);
        let header = header();
        let context = StitchContext::from_tiles(&layout, Some(&header), &tiles).unwrap();
        assert_eq!(context.parameter_set_id(), 2);

        let packet = context.stitch_gop(&tiles, 1).unwrap();
        assert_eq!(packet.first_frame, 3);
        assert_eq!(packet.frame_count, 3);
        assert_eq!(packet.slice_count, 12);

        let units = split_nal_units(&packet.data).unwrap();
        let pps: Vec<_> = units
            .iter()
            .filter(|u| u.nal_type == NalUnitType::PpsNut)
            .collect();
        assert_eq!(pps.len(), 1);
        let pps = ParameterSet::parse(pps[0].data(&packet.data)).unwrap();
        assert_eq!(pps.tile_dimensions(), (2, 2));
        assert_eq!(pps.parameter_set_id(), 2);

        let slices: Vec<_> = units.iter().filter(|u| u.nal_type.is_vcl()).collect();
        assert_eq!(slices.len(), 12);
        for unit in slices {
            let slice = SliceHeader::parse(unit.data(&packet.data)).unwrap();
            assert_eq!(slice.slice_pic_parameter_set_id(), 2);
        }
    }

    #[test]
    fn test_slices_in_row_major_order() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        let tiles = tiles([3; 4]);
        let context = StitchContext::new(&layout, &header().parameter_sets(), Some(1)).unwrap();
        assert_eq!(context.parameter_set_id(), 1);

        let packet = context.stitch_gop(&tiles, 0).unwrap();
        let units = split_nal_units(&packet.data).unwrap();
        let seeds: Vec<u8> = units
            .iter()
            .filter(|u| u.nal_type.is_vcl())
            .map(|u| u.data(&packet.data).to_vec())
            .map(|data| {
                let tile = tiles
                    .iter()
                    .position(|t| {
                        (0..6).any(|f| {
                            t.picture(f)
                                .map(|p| p.nals.iter().any(|n| n.data[..] == data[..]))
                                .unwrap_or(false)
                        })
                    })
                    .unwrap();
                tile as u8
            })
            .collect();
        assert_eq!(seeds, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]);
    }

    fn stitched_pps(context: &StitchContext) -> ParameterSet {
        let data = context.parameter_sets();
        let units = split_nal_units(data).unwrap();
        let pps = units
            .iter()
            .find(|u| u.nal_type == NalUnitType::PpsNut)
            .unwrap();
        ParameterSet::parse(pps.data(data)).unwrap()
    }

    #[test]
    fn test_non_uniform_layout_signals_explicit_sizes() {
        let layout = TileLayout::from_dimensions(vec![128, 64, 128], vec![64, 176]).unwrap();
        assert!(!layout.is_uniform());
        let context = StitchContext::new(&layout, &header().parameter_sets(), None).unwrap();

        let pps = stitched_pps(&context);
        assert_eq!(pps.tile_dimensions(), (2, 3));
        assert!(!pps.uniform_spacing());
        // 64-sample CTBs; the last column and row are implicit
        assert_eq!(pps.explicit_tile_sizes(), Some((&[2, 1][..], &[1][..])));
    }

    #[test]
    fn test_uniform_layout_keeps_uniform_spacing() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        let context = StitchContext::new(&layout, &header().parameter_sets(), None).unwrap();
        let pps = stitched_pps(&context);
        assert!(pps.uniform_spacing());
        assert_eq!(pps.explicit_tile_sizes(), None);
    }

    #[test]
    fn test_layout_off_the_ctb_grid_is_rejected() {
        let layout = TileLayout::from_dimensions(vec![100, 220], vec![240]).unwrap();
        assert_matches!(
            StitchContext::new(&layout, &header().parameter_sets(), None),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn test_tile_zero_pps_without_grid_overflows() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        let tiles = tiles([3; 4]);
        let result = StitchContext::from_tiles(&layout, None, &tiles);
        assert_matches!(
            result,
            Err(Error::Bitstream(BitstreamError::FieldWidthOverflow { width: 0, .. }))
        );

        let single = TileLayout::uniform(320, 240, 1, 1).unwrap();
        let context = StitchContext::from_tiles(&single, None, &tiles[..1]).unwrap();
        let packet = context.stitch_gop(&tiles[..1], 0).unwrap();
        assert_eq!(packet.slice_count, 3);
    }

    #[test]
    fn test_suffix_sei_follows_every_tile_slice() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        let pps = PpsBuilder::new(1);
        let tiles: Vec<_> = (0..4u8)
            .map(|t| {
                let stream = synth::annex_b([
                    synth::vps(),
                    synth::sps(),
                    pps.build(),
                    vec![0x4E, 0x01, 0x05, 0x80], // prefix SEI
                    synth::slice(NalUnitType::IdrWRadl, true, 1, &[t]),
                    vec![0x50, 0x01, 0x05, 0x80], // suffix SEI
                ]);
                EncodedFrameReader::from_bytes(Bytes::from(stream)).unwrap()
            })
            .collect();
        let context = StitchContext::from_tiles(&layout, Some(&header()), &tiles).unwrap();

        let packet = context.stitch_gop(&tiles, 0).unwrap();
        let types: Vec<_> = split_nal_units(&packet.data)
            .unwrap()
            .into_iter()
            .map(|u| u.nal_type)
            .filter(|t| !t.is_parameter_set())
            .collect();
        assert_eq!(
            types,
            vec![
                NalUnitType::PrefixSeiNut,
                NalUnitType::IdrWRadl,
                NalUnitType::IdrWRadl,
                NalUnitType::IdrWRadl,
                NalUnitType::IdrWRadl,
                NalUnitType::SuffixSeiNut,
            ]
        );
    }

    #[test]
    fn test_gop_structure_mismatch() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        let tiles = tiles([3, 3, 3, 2]);
        let context = StitchContext::from_tiles(&layout, Some(&header()), &tiles).unwrap();
        assert_matches!(
            context.stitch_gop(&tiles, 0),
            Err(Error::GopStructureMismatch { gop: 0, tile: 3, .. })
        );
    }

    #[test]
    fn test_tile_count_must_match_grid() {
        let layout = TileLayout::uniform(320, 240, 2, 2).unwrap();
        let tiles = tiles([3; 4]);
        let context = StitchContext::from_tiles(&layout, Some(&header()), &tiles).unwrap();
        assert_matches!(
            context.stitch_gop(&tiles[..3], 0),
            Err(Error::InvalidArgument(_))
        );
    }
}
