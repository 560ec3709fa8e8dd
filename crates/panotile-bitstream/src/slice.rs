//! Slice segment headers (7.3.6.1), as far as slice_pic_parameter_set_id.

use crate::bits::{ue_width, BitArray, BitReader};
use crate::emulation::{insert_escapes_and_marker, remove_escapes};
use crate::nal::{strip_start_code, NalUnitType, NAL_HEADER_SIZE};
use crate::parameter_set::{nal_type_of, read_ue_field, Field, MAX_PPS_ID};
use crate::writer::RbspWriter;
use crate::{BitstreamError, Result};

/// A slice segment NAL unit whose PPS reference can be rewritten.
///
/// Everything after slice_pic_parameter_set_id is entropy-coded data this
/// type never interprets, so the id may only be replaced by a codeword of the
/// same width.
#[derive(Debug, Clone)]
pub struct SliceHeader {
    bits: BitArray,
    nal_type: NalUnitType,
    first_in_picture: bool,
    pps_id: Field,
}

impl SliceHeader {
    /// Parse a slice NAL unit. A leading start code is optional.
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let data = strip_start_code(nal).unwrap_or(nal);
        if data.len() < NAL_HEADER_SIZE {
            return Err(BitstreamError::ShortNalUnit {
                offset: 0,
                len: data.len(),
            });
        }
        let bits = remove_escapes(data, NAL_HEADER_SIZE, data.len());

        let nal_type = nal_type_of(&bits)?;
        if !nal_type.is_vcl() {
            return Err(BitstreamError::UnexpectedNalType {
                expected: "slice segment",
                found: u8::from(nal_type),
            });
        }

        let mut reader = BitReader::at(&bits, NAL_HEADER_SIZE * 8);
        let first_in_picture = reader
            .read_flag()
            .ok_or_else(|| BitstreamError::truncated("first_slice_segment_in_pic_flag"))?;
        if nal_type.is_irap() {
            reader
                .skip(1)
                .ok_or_else(|| BitstreamError::truncated("no_output_of_prior_pics_flag"))?;
        }
        let pps_id = read_ue_field(&mut reader, "slice_pic_parameter_set_id")?;

        Ok(Self {
            bits,
            nal_type,
            first_in_picture,
            pps_id,
        })
    }

    pub fn nal_type(&self) -> NalUnitType {
        self.nal_type
    }

    pub fn first_slice_segment_in_pic(&self) -> bool {
        self.first_in_picture
    }

    pub fn slice_pic_parameter_set_id(&self) -> u32 {
        self.pps_id.value
    }

    /// Point the slice at a different PPS.
    pub fn set_slice_pic_parameter_set_id(&mut self, id: u32) -> Result<()> {
        if id > MAX_PPS_ID {
            return Err(BitstreamError::InvalidFieldValue {
                field: "slice_pic_parameter_set_id",
                value: id,
            });
        }
        if id == self.pps_id.value {
            return Ok(());
        }

        let required = ue_width(id);
        if required > self.pps_id.width {
            return Err(BitstreamError::overflow(
                "slice_pic_parameter_set_id",
                self.pps_id.width,
                required,
            ));
        }
        if required < self.pps_id.width {
            return Err(BitstreamError::UnalignedRewrite {
                field: "slice_pic_parameter_set_id",
                width: self.pps_id.width,
                required,
            });
        }

        let mut writer = RbspWriter::new();
        writer.write_ue(id)?;
        let codeword = writer.into_bits()?;
        self.bits
            .splice(self.pps_id.offset..self.pps_id.end(), &codeword);
        self.pps_id.value = id;
        Ok(())
    }

    /// Escaped bytes with a leading four-byte start code.
    pub fn bytes(&self) -> Vec<u8> {
        insert_escapes_and_marker(&self.bits, NAL_HEADER_SIZE, self.bits.byte_len(), false).0
    }
}
