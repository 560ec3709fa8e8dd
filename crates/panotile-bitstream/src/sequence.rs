//! HEVC sequence parameter set (7.3.2.2), read as far as the CTB size.
//!
//! Explicit tile sizes in a PPS are counted in coding tree blocks, so
//! stitching a non-uniform grid needs the CTB size of the sequence.

use crate::bits::{BitArray, BitReader};
use crate::emulation::remove_escapes;
use crate::nal::{strip_start_code, NalUnitType, NAL_HEADER_SIZE};
use crate::parameter_set::{nal_type_of, read_flag, read_ue_field, skip_ue};
use crate::{BitstreamError, Result};

/// Fields of an SPS preceding the first one this crate does not need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceParameterSet {
    sps_id: u32,
    width: u32,
    height: u32,
    log2_ctb_size: u32,
}

impl SequenceParameterSet {
    /// Parse an SPS NAL unit. A leading start code is optional.
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let data = strip_start_code(nal).unwrap_or(nal);
        if data.len() < NAL_HEADER_SIZE {
            return Err(BitstreamError::ShortNalUnit {
                offset: 0,
                len: data.len(),
            });
        }
        Self::from_bits(&remove_escapes(data, NAL_HEADER_SIZE, data.len()))
    }

    fn from_bits(bits: &BitArray) -> Result<Self> {
        let nal_type = nal_type_of(bits)?;
        if nal_type != NalUnitType::SpsNut {
            return Err(BitstreamError::UnexpectedNalType {
                expected: "SPS",
                found: u8::from(nal_type),
            });
        }

        let mut r = BitReader::at(bits, NAL_HEADER_SIZE * 8);
        r.skip(4)
            .ok_or_else(|| BitstreamError::truncated("sps_video_parameter_set_id"))?;
        let max_sub_layers_minus1 = r
            .read_bits(3)
            .ok_or_else(|| BitstreamError::truncated("sps_max_sub_layers_minus1"))?;
        read_flag(&mut r, "sps_temporal_id_nesting_flag")?;
        skip_profile_tier_level(&mut r, max_sub_layers_minus1)?;

        let sps_id = read_ue_field(&mut r, "sps_seq_parameter_set_id")?.value;
        let chroma_format_idc = read_ue_field(&mut r, "chroma_format_idc")?.value;
        if chroma_format_idc == 3 {
            read_flag(&mut r, "separate_colour_plane_flag")?;
        }
        let width = read_ue_field(&mut r, "pic_width_in_luma_samples")?.value;
        let height = read_ue_field(&mut r, "pic_height_in_luma_samples")?.value;
        if read_flag(&mut r, "conformance_window_flag")? {
            for _ in 0..4 {
                skip_ue(&mut r, "conf_win_offset")?;
            }
        }
        skip_ue(&mut r, "bit_depth_luma_minus8")?;
        skip_ue(&mut r, "bit_depth_chroma_minus8")?;
        skip_ue(&mut r, "log2_max_pic_order_cnt_lsb_minus4")?;

        let first = if read_flag(&mut r, "sps_sub_layer_ordering_info_present_flag")? {
            0
        } else {
            max_sub_layers_minus1
        };
        for _ in first..=max_sub_layers_minus1 {
            skip_ue(&mut r, "sps_max_dec_pic_buffering_minus1")?;
            skip_ue(&mut r, "sps_max_num_reorder_pics")?;
            skip_ue(&mut r, "sps_max_latency_increase_plus1")?;
        }

        let min_cb_minus3 = read_ue_field(&mut r, "log2_min_luma_coding_block_size_minus3")?.value;
        let diff = read_ue_field(&mut r, "log2_diff_max_min_luma_coding_block_size")?.value;
        let log2_ctb_size = min_cb_minus3 + 3 + diff;
        if !(4..=6).contains(&log2_ctb_size) {
            return Err(BitstreamError::InvalidFieldValue {
                field: "log2_diff_max_min_luma_coding_block_size",
                value: diff,
            });
        }

        Ok(Self {
            sps_id,
            width,
            height,
            log2_ctb_size,
        })
    }

    pub fn seq_parameter_set_id(&self) -> u32 {
        self.sps_id
    }

    /// Picture size in luma samples as `(width, height)`.
    pub fn picture_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Width and height of a coding tree block in luma samples.
    pub fn ctb_size(&self) -> u32 {
        1 << self.log2_ctb_size
    }
}

fn skip_profile_tier_level(r: &mut BitReader<'_>, max_sub_layers_minus1: u32) -> Result<()> {
    r.skip(96)
        .ok_or_else(|| BitstreamError::truncated("general_profile_tier_level"))?;

    let mut present = Vec::with_capacity(max_sub_layers_minus1 as usize);
    for _ in 0..max_sub_layers_minus1 {
        let profile = read_flag(r, "sub_layer_profile_present_flag")?;
        let level = read_flag(r, "sub_layer_level_present_flag")?;
        present.push((profile, level));
    }
    if max_sub_layers_minus1 > 0 {
        r.skip(2 * (8 - max_sub_layers_minus1 as usize))
            .ok_or_else(|| BitstreamError::truncated("reserved_zero_2bits"))?;
    }
    for (profile, level) in present {
        let bits = usize::from(profile) * 88 + usize::from(level) * 8;
        r.skip(bits)
            .ok_or_else(|| BitstreamError::truncated("sub_layer_profile_tier_level"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_synthetic_sps() {
        let sps = SequenceParameterSet::parse(&synth::sps_with_ctb(1920, 1080, 5)).unwrap();
        assert_eq!(sps.seq_parameter_set_id(), 0);
        assert_eq!(sps.picture_size(), (1920, 1080));
        assert_eq!(sps.ctb_size(), 32);
    }

    #[test]
    fn test_default_synthetic_ctb_is_64() {
        let sps = SequenceParameterSet::parse(&synth::sps()).unwrap();
        assert_eq!(sps.picture_size(), (320, 240));
        assert_eq!(sps.ctb_size(), 64);
    }

    #[test]
    fn test_truncated_sps() {
        let nal = synth::sps();
        assert_matches!(
            SequenceParameterSet::parse(&nal[..12]),
            Err(BitstreamError::Truncated { .. })
        );
    }

    #[test]
    fn test_rejects_pps() {
        let pps = synth::PpsBuilder::new(0).build();
        assert_matches!(
            SequenceParameterSet::parse(&pps),
            Err(BitstreamError::UnexpectedNalType { found: 34, .. })
        );
    }
}
