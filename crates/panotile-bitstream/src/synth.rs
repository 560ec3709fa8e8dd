//! Builders for small synthetic HEVC streams.
//!
//! The units produced here are syntactically plausible up to the fields this
//! crate parses and carry arbitrary bytes where entropy-coded data would be.
//! They are not decodable pictures.

use crate::bits::BitArray;
use crate::emulation::insert_escapes_and_marker;
use crate::nal::{nal_header_bytes, NalUnitType, NAL_HEADER_SIZE, START_CODE};
use crate::writer::RbspWriter;
use std::io;

/// Escape an RBSP behind a NAL header. The result has no start code.
fn finish(nal_type: NalUnitType, rbsp: io::Result<Vec<u8>>) -> Vec<u8> {
    let mut raw = nal_header_bytes(nal_type).to_vec();
    // writes into a Vec<u8> cannot fail
    raw.extend(rbsp.unwrap_or_default());
    let bits = BitArray::from_bytes(&raw);
    let (framed, _) = insert_escapes_and_marker(&bits, NAL_HEADER_SIZE, bits.byte_len(), false);
    framed[START_CODE.len()..].to_vec()
}

/// A minimal video parameter set.
pub fn vps() -> Vec<u8> {
    finish(NalUnitType::VpsNut, vps_rbsp())
}

fn vps_rbsp() -> io::Result<Vec<u8>> {
    let mut w = RbspWriter::new();
    w.write_bits(4, 0)?; // vps_video_parameter_set_id
    w.write_bits(2, 0b11)?;
    w.write_bits(6, 0)?; // vps_max_layers_minus1
    w.write_bits(3, 0)?; // vps_max_sub_layers_minus1
    w.write_flag(true)?;
    w.write_bits(16, 0xFFFF)?;
    w.finish_rbsp()
}

/// A sequence parameter set carrying the picture size, with 64x64 CTBs.
pub fn sps_with_size(width: u32, height: u32) -> Vec<u8> {
    sps_with_ctb(width, height, 6)
}

/// A sequence parameter set with CTBs of `1 << log2_ctb_size` samples.
pub fn sps_with_ctb(width: u32, height: u32, log2_ctb_size: u32) -> Vec<u8> {
    finish(NalUnitType::SpsNut, sps_rbsp(width, height, log2_ctb_size))
}

fn sps_rbsp(width: u32, height: u32, log2_ctb_size: u32) -> io::Result<Vec<u8>> {
    let mut w = RbspWriter::new();
    w.write_bits(4, 0)?; // sps_video_parameter_set_id
    w.write_bits(3, 0)?; // sps_max_sub_layers_minus1
    w.write_flag(true)?;
    // profile_tier_level: Main profile, level 3.1
    w.write_bits(8, 0x01)?;
    w.write_bits(32, 0x6000_0000)?;
    w.write_bits(4, 0b1001)?;
    w.write_bits(44, 0)?;
    w.write_bits(8, 93)?;
    w.write_ue(0)?; // sps_seq_parameter_set_id
    w.write_ue(1)?; // chroma_format_idc
    w.write_ue(width)?;
    w.write_ue(height)?;
    w.write_flag(false)?; // conformance_window_flag
    w.write_ue(0)?;
    w.write_ue(0)?;
    w.write_ue(4)?; // log2_max_pic_order_cnt_lsb_minus4
    w.write_flag(true)?; // sps_sub_layer_ordering_info_present_flag
    w.write_ue(4)?;
    w.write_ue(0)?;
    w.write_ue(0)?;
    w.write_ue(0)?; // log2_min_luma_coding_block_size_minus3
    w.write_ue(log2_ctb_size.saturating_sub(3))?;
    w.finish_rbsp()
}

pub fn sps() -> Vec<u8> {
    sps_with_size(320, 240)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TileGrid {
    rows: u32,
    columns: u32,
    uniform: bool,
}

/// Picture parameter set builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpsBuilder {
    pps_id: u32,
    sps_id: u32,
    cabac_init_present: bool,
    entropy_coding_sync: bool,
    loop_filter_across_tiles: bool,
    tiles: Option<TileGrid>,
}

impl PpsBuilder {
    pub fn new(pps_id: u32) -> Self {
        Self {
            pps_id,
            sps_id: 0,
            cabac_init_present: false,
            entropy_coding_sync: false,
            loop_filter_across_tiles: true,
            tiles: None,
        }
    }

    pub fn pps_id(&self) -> u32 {
        self.pps_id
    }

    /// Uniformly spaced `rows` x `columns` tile grid.
    pub fn tiles(mut self, rows: u32, columns: u32) -> Self {
        self.tiles = Some(TileGrid {
            rows,
            columns,
            uniform: true,
        });
        self
    }

    /// Tile grid with explicit column widths and row heights.
    pub fn explicit_tiles(mut self, rows: u32, columns: u32) -> Self {
        self.tiles = Some(TileGrid {
            rows,
            columns,
            uniform: false,
        });
        self
    }

    pub fn cabac_init_present(mut self, present: bool) -> Self {
        self.cabac_init_present = present;
        self
    }

    pub fn entropy_coding_sync(mut self, enabled: bool) -> Self {
        self.entropy_coding_sync = enabled;
        self
    }

    pub fn loop_filter_across_tiles(mut self, enabled: bool) -> Self {
        self.loop_filter_across_tiles = enabled;
        self
    }

    /// Escaped NAL unit, header included, without a start code.
    pub fn build(&self) -> Vec<u8> {
        finish(NalUnitType::PpsNut, self.rbsp())
    }

    fn rbsp(&self) -> io::Result<Vec<u8>> {
        let mut w = RbspWriter::new();
        w.write_ue(self.pps_id)?;
        w.write_ue(self.sps_id)?;
        w.write_flag(false)?; // dependent_slice_segments_enabled_flag
        w.write_flag(false)?; // output_flag_present_flag
        w.write_bits(3, 0)?; // num_extra_slice_header_bits
        w.write_flag(false)?; // sign_data_hiding_enabled_flag
        w.write_flag(self.cabac_init_present)?;
        w.write_ue(0)?;
        w.write_ue(0)?;
        w.write_se(0)?; // init_qp_minus26
        w.write_flag(false)?;
        w.write_flag(false)?;
        w.write_flag(true)?; // cu_qp_delta_enabled_flag
        w.write_ue(1)?; // diff_cu_qp_delta_depth
        w.write_se(0)?;
        w.write_se(0)?;
        w.write_flag(false)?;
        w.write_flag(false)?;
        w.write_flag(false)?;
        w.write_flag(false)?;
        w.write_flag(self.tiles.is_some())?;
        w.write_flag(self.entropy_coding_sync)?;
        if let Some(grid) = self.tiles {
            w.write_ue(grid.columns.saturating_sub(1))?;
            w.write_ue(grid.rows.saturating_sub(1))?;
            w.write_flag(grid.uniform)?;
            if !grid.uniform {
                for _ in 1..grid.columns {
                    w.write_ue(0)?;
                }
                for _ in 1..grid.rows {
                    w.write_ue(0)?;
                }
            }
            w.write_flag(self.loop_filter_across_tiles)?;
        }
        w.write_flag(true)?; // pps_loop_filter_across_slices_enabled_flag
        w.write_flag(false)?; // deblocking_filter_control_present_flag
        w.write_flag(false)?; // pps_scaling_list_data_present_flag
        w.write_flag(false)?; // lists_modification_present_flag
        w.write_ue(0)?; // log2_parallel_merge_level_minus2
        w.write_flag(false)?;
        w.write_flag(false)?; // pps_extension_present_flag
        w.finish_rbsp()
    }
}

/// A slice NAL unit whose header ends at slice_pic_parameter_set_id,
/// followed by `body` as stand-in slice data.
pub fn slice(nal_type: NalUnitType, first_in_picture: bool, pps_id: u32, body: &[u8]) -> Vec<u8> {
    finish(nal_type, slice_rbsp(nal_type, first_in_picture, pps_id, body))
}

fn slice_rbsp(
    nal_type: NalUnitType,
    first_in_picture: bool,
    pps_id: u32,
    body: &[u8],
) -> io::Result<Vec<u8>> {
    let mut w = RbspWriter::new();
    w.write_flag(first_in_picture)?;
    if nal_type.is_irap() {
        w.write_flag(false)?; // no_output_of_prior_pics_flag
    }
    w.write_ue(pps_id)?;
    for &byte in body {
        w.write_bits(8, u64::from(byte))?;
    }
    w.finish_rbsp()
}

/// Join NAL units into an Annex B byte stream with four-byte start codes.
pub fn annex_b<I, N>(nals: I) -> Vec<u8>
where
    I: IntoIterator<Item = N>,
    N: AsRef<[u8]>,
{
    let mut stream = Vec::new();
    for nal in nals {
        stream.extend_from_slice(&START_CODE);
        stream.extend_from_slice(nal.as_ref());
    }
    stream
}

/// Parameter sets only, as stored in a full-frame header file.
pub fn header_stream(pps: &PpsBuilder) -> Vec<u8> {
    annex_b([vps(), sps(), pps.build()])
}

/// A single-slice-per-picture stream of `frames` pictures with an IDR every
/// `gop_length` pictures. `seed` distinguishes the slice data of different tiles.
pub fn tile_stream(frames: usize, gop_length: usize, pps: &PpsBuilder, seed: u8) -> Vec<u8> {
    let gop_length = gop_length.max(1);
    let mut nals = vec![vps(), sps(), pps.build()];
    for frame in 0..frames {
        let nal_type = if frame % gop_length == 0 {
            NalUnitType::IdrWRadl
        } else {
            NalUnitType::TrailR
        };
        nals.push(slice(nal_type, true, pps.pps_id(), &[seed, frame as u8, 0xA5]));
    }
    annex_b(nals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::split_nal_units;

    #[test]
    fn test_tile_stream_layout() {
        let stream = tile_stream(6, 3, &PpsBuilder::new(0), 1);
        let units = split_nal_units(&stream).unwrap();
        let types: Vec<_> = units.iter().map(|u| u.nal_type).collect();
        assert_eq!(
            types,
            vec![
                NalUnitType::VpsNut,
                NalUnitType::SpsNut,
                NalUnitType::PpsNut,
                NalUnitType::IdrWRadl,
                NalUnitType::TrailR,
                NalUnitType::TrailR,
                NalUnitType::IdrWRadl,
                NalUnitType::TrailR,
                NalUnitType::TrailR,
            ]
        );
    }

    #[test]
    fn test_units_contain_no_start_code_emulation() {
        let nal = slice(NalUnitType::TrailR, true, 0, &[0, 0, 0, 1, 0, 0, 2]);
        assert!(crate::emulation::validate_escapes(&nal).is_ok());
        assert_eq!(split_nal_units(&annex_b([&nal])).unwrap().len(), 1);
    }
}
