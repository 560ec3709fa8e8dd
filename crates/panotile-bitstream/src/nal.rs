//! HEVC NAL unit framing

use crate::{BitstreamError, Result};

/// Four-byte start-code marker written in front of every emitted NAL unit.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Size of the HEVC NAL unit header in bytes.
pub const NAL_HEADER_SIZE: usize = 2;

/// HEVC NAL unit types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// Coded slice of trailing picture
    TrailN,
    TrailR,
    /// Coded slice of TSA picture
    TsaN,
    TsaR,
    /// Coded slice of STSA picture
    StsaN,
    StsaR,
    /// Coded slice of RADL picture
    RadlN,
    RadlR,
    /// Coded slice of RASL picture
    RaslN,
    RaslR,
    /// Coded slice of BLA picture
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    /// Coded slice of IDR picture
    IdrWRadl,
    IdrNLp,
    /// Coded slice of CRA picture
    CraNut,
    /// Video Parameter Set
    VpsNut,
    /// Sequence Parameter Set
    SpsNut,
    /// Picture Parameter Set
    PpsNut,
    /// Access Unit Delimiter
    AudNut,
    /// End of Sequence
    EosNut,
    /// End of Bitstream
    EobNut,
    /// Filler Data
    FdNut,
    /// SEI Prefix
    PrefixSeiNut,
    /// SEI Suffix
    SuffixSeiNut,
    /// Reserved or unspecified
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            0 => NalUnitType::TrailN,
            1 => NalUnitType::TrailR,
            2 => NalUnitType::TsaN,
            3 => NalUnitType::TsaR,
            4 => NalUnitType::StsaN,
            5 => NalUnitType::StsaR,
            6 => NalUnitType::RadlN,
            7 => NalUnitType::RadlR,
            8 => NalUnitType::RaslN,
            9 => NalUnitType::RaslR,
            16 => NalUnitType::BlaWLp,
            17 => NalUnitType::BlaWRadl,
            18 => NalUnitType::BlaNLp,
            19 => NalUnitType::IdrWRadl,
            20 => NalUnitType::IdrNLp,
            21 => NalUnitType::CraNut,
            32 => NalUnitType::VpsNut,
            33 => NalUnitType::SpsNut,
            34 => NalUnitType::PpsNut,
            35 => NalUnitType::AudNut,
            36 => NalUnitType::EosNut,
            37 => NalUnitType::EobNut,
            38 => NalUnitType::FdNut,
            39 => NalUnitType::PrefixSeiNut,
            40 => NalUnitType::SuffixSeiNut,
            v => NalUnitType::Other(v),
        }
    }
}

impl From<NalUnitType> for u8 {
    fn from(value: NalUnitType) -> Self {
        match value {
            NalUnitType::TrailN => 0,
            NalUnitType::TrailR => 1,
            NalUnitType::TsaN => 2,
            NalUnitType::TsaR => 3,
            NalUnitType::StsaN => 4,
            NalUnitType::StsaR => 5,
            NalUnitType::RadlN => 6,
            NalUnitType::RadlR => 7,
            NalUnitType::RaslN => 8,
            NalUnitType::RaslR => 9,
            NalUnitType::BlaWLp => 16,
            NalUnitType::BlaWRadl => 17,
            NalUnitType::BlaNLp => 18,
            NalUnitType::IdrWRadl => 19,
            NalUnitType::IdrNLp => 20,
            NalUnitType::CraNut => 21,
            NalUnitType::VpsNut => 32,
            NalUnitType::SpsNut => 33,
            NalUnitType::PpsNut => 34,
            NalUnitType::AudNut => 35,
            NalUnitType::EosNut => 36,
            NalUnitType::EobNut => 37,
            NalUnitType::FdNut => 38,
            NalUnitType::PrefixSeiNut => 39,
            NalUnitType::SuffixSeiNut => 40,
            NalUnitType::Other(v) => v,
        }
    }
}

impl NalUnitType {
    /// Coded slice segment (types 0..=31).
    pub fn is_vcl(self) -> bool {
        u8::from(self) < 32
    }

    /// Intra random access point: BLA, IDR, CRA and the reserved IRAP types.
    pub fn is_irap(self) -> bool {
        (16..=23).contains(&u8::from(self))
    }

    /// Non-VCL units that follow the slices of their access unit: suffix
    /// SEI, end of sequence or bitstream, filler data, and the reserved
    /// suffix types.
    pub fn is_suffix(self) -> bool {
        matches!(u8::from(self), 36..=38 | 40 | 45..=47 | 56..=63)
    }

    /// VPS, SPS or PPS.
    pub fn is_parameter_set(self) -> bool {
        matches!(
            self,
            NalUnitType::VpsNut | NalUnitType::SpsNut | NalUnitType::PpsNut
        )
    }
}

/// A NAL unit located inside a byte stream.
///
/// The unit does not own its bytes; `start..end` indexes the stream it was
/// split from and covers the header and escaped payload, without the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    /// NAL unit type
    pub nal_type: NalUnitType,
    /// Layer ID
    pub nuh_layer_id: u8,
    /// Temporal ID
    pub nuh_temporal_id_plus1: u8,
    /// Offset of the start-code marker
    pub marker_start: usize,
    /// Offset of the first header byte
    pub start: usize,
    /// Offset one past the last payload byte
    pub end: usize,
}

impl NalUnit {
    /// Header and escaped payload, without the marker.
    pub fn data<'a>(&self, stream: &'a [u8]) -> &'a [u8] {
        &stream[self.start..self.end]
    }

    /// Marker, header and payload as they appear in the stream.
    pub fn framed<'a>(&self, stream: &'a [u8]) -> &'a [u8] {
        &stream[self.marker_start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Header fields of a NAL unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_type: NalUnitType,
    pub nuh_layer_id: u8,
    pub nuh_temporal_id_plus1: u8,
}

/// Parse the two-byte header at the front of `data` (marker already removed).
pub fn parse_nal_header(data: &[u8]) -> Result<NalHeader> {
    if data.len() < NAL_HEADER_SIZE {
        return Err(BitstreamError::ShortNalUnit {
            offset: 0,
            len: data.len(),
        });
    }

    // forbidden_zero_bit (1) | nal_unit_type (6) | nuh_layer_id (6) | nuh_temporal_id_plus1 (3)
    if (data[0] >> 7) & 0x01 != 0 {
        return Err(BitstreamError::ForbiddenBit { offset: 0 });
    }

    let nal_unit_type = (data[0] >> 1) & 0x3F;
    let nuh_layer_id = ((data[0] & 0x01) << 5) | ((data[1] >> 3) & 0x1F);
    let nuh_temporal_id_plus1 = data[1] & 0x07;

    Ok(NalHeader {
        nal_type: NalUnitType::from(nal_unit_type),
        nuh_layer_id,
        nuh_temporal_id_plus1,
    })
}

/// Two header bytes for a NAL unit of `nal_type` in the base layer.
pub fn nal_header_bytes(nal_type: NalUnitType) -> [u8; NAL_HEADER_SIZE] {
    [u8::from(nal_type) << 1, 0x01]
}

/// Split an Annex B byte stream into NAL units.
///
/// Both 3-byte and 4-byte start codes are recognised. Zero bytes before the
/// first start code are allowed; any other leading byte is an error.
pub fn split_nal_units(data: &[u8]) -> Result<Vec<NalUnit>> {
    let markers = find_start_codes(data);

    match markers.first() {
        None if data.iter().all(|&b| b == 0) => return Ok(Vec::new()),
        None => return Err(BitstreamError::MissingStartCode { offset: 0 }),
        Some(&(marker_start, _)) => {
            if data[..marker_start].iter().any(|&b| b != 0) {
                return Err(BitstreamError::MissingStartCode { offset: 0 });
            }
        }
    }

    let mut units = Vec::with_capacity(markers.len());
    for (idx, &(marker_start, start)) in markers.iter().enumerate() {
        let mut end = markers
            .get(idx + 1)
            .map(|&(next_marker, _)| next_marker)
            .unwrap_or(data.len());

        // trailing_zero_8bits belong to neither unit
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }

        if end - start < NAL_HEADER_SIZE {
            return Err(BitstreamError::ShortNalUnit {
                offset: start,
                len: end - start,
            });
        }

        let header = parse_nal_header(&data[start..end]).map_err(|err| match err {
            BitstreamError::ForbiddenBit { .. } => BitstreamError::ForbiddenBit { offset: start },
            other => other,
        })?;

        units.push(NalUnit {
            nal_type: header.nal_type,
            nuh_layer_id: header.nuh_layer_id,
            nuh_temporal_id_plus1: header.nuh_temporal_id_plus1,
            marker_start,
            start,
            end,
        });
    }

    Ok(units)
}

/// Positions of every start code as `(marker_start, payload_start)`.
fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut markers = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let marker_start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            markers.push((marker_start, i + 3));
            i += 3;
            continue;
        }
        i += 1;
    }

    markers
}

/// Remove a leading 4- or 3-byte start code.
pub fn strip_start_code(data: &[u8]) -> Result<&[u8]> {
    if data.starts_with(&START_CODE) {
        Ok(&data[4..])
    } else if data.starts_with(&START_CODE[1..]) {
        Ok(&data[3..])
    } else {
        Err(BitstreamError::MissingStartCode { offset: 0 })
    }
}

/// Read first_slice_segment_in_pic_flag from a slice NAL unit (marker removed).
///
/// Returns `None` for non-VCL units. The flag is the first bit after the
/// header, which no escape byte can precede.
pub fn first_slice_segment_in_pic(data: &[u8]) -> Option<bool> {
    let header = parse_nal_header(data).ok()?;
    if !header.nal_type.is_vcl() {
        return None;
    }
    data.get(NAL_HEADER_SIZE).map(|b| b & 0x80 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_type_from_u8() {
        assert_eq!(NalUnitType::from(33), NalUnitType::SpsNut);
        assert_eq!(NalUnitType::from(39), NalUnitType::PrefixSeiNut);
        assert_eq!(NalUnitType::from(22), NalUnitType::Other(22));
        assert_eq!(u8::from(NalUnitType::PpsNut), 34);
        assert_eq!(u8::from(NalUnitType::Other(62)), 62);
    }

    #[test]
    fn test_nal_type_classes() {
        assert!(NalUnitType::IdrWRadl.is_irap());
        assert!(NalUnitType::CraNut.is_irap());
        assert!(NalUnitType::Other(23).is_irap());
        assert!(!NalUnitType::TrailR.is_irap());
        assert!(NalUnitType::TrailR.is_vcl());
        assert!(!NalUnitType::PpsNut.is_vcl());
        assert!(NalUnitType::VpsNut.is_parameter_set());
        assert!(!NalUnitType::PrefixSeiNut.is_parameter_set());
        assert!(NalUnitType::SuffixSeiNut.is_suffix());
        assert!(NalUnitType::EosNut.is_suffix());
        assert!(!NalUnitType::PrefixSeiNut.is_suffix());
        assert!(!NalUnitType::AudNut.is_suffix());
    }

    #[test]
    fn test_split_mixed_start_codes() {
        let stream = [
            0, 0, 0, 1, 0x40, 0x01, 0xAA, // VPS, 4-byte marker
            0, 0, 1, 0x42, 0x01, 0xBB, 0xCC, // SPS, 3-byte marker
            0, 0, 0, 1, 0x26, 0x01, 0xAF, 0x00, // IDR with trailing zero byte
        ];
        let units = split_nal_units(&stream).unwrap();
        assert_eq!(units.len(), 3);

        assert_eq!(units[0].nal_type, NalUnitType::VpsNut);
        assert_eq!(units[0].data(&stream), &[0x40, 0x01, 0xAA]);
        assert_eq!(units[0].marker_start, 0);

        assert_eq!(units[1].nal_type, NalUnitType::SpsNut);
        assert_eq!(units[1].framed(&stream), &[0, 0, 1, 0x42, 0x01, 0xBB, 0xCC]);

        assert_eq!(units[2].nal_type, NalUnitType::IdrWRadl);
        assert_eq!(units[2].data(&stream), &[0x26, 0x01, 0xAF]);
        assert_eq!(units[2].nuh_temporal_id_plus1, 1);
    }

    #[test]
    fn test_split_requires_leading_start_code() {
        let stream = [0x40, 0x01, 0, 0, 0, 1, 0x42, 0x01];
        assert_eq!(
            split_nal_units(&stream),
            Err(BitstreamError::MissingStartCode { offset: 0 })
        );
        assert_eq!(split_nal_units(&[]), Ok(Vec::new()));
    }

    #[test]
    fn test_split_short_unit() {
        let stream = [0, 0, 0, 1, 0x40, 0, 0, 0, 1, 0x42, 0x01];
        assert!(matches!(
            split_nal_units(&stream),
            Err(BitstreamError::ShortNalUnit { offset: 4, .. })
        ));
    }

    #[test]
    fn test_forbidden_bit() {
        let stream = [0, 0, 0, 1, 0xC0, 0x01, 0x11];
        assert_eq!(
            split_nal_units(&stream),
            Err(BitstreamError::ForbiddenBit { offset: 4 })
        );
    }

    #[test]
    fn test_strip_start_code() {
        assert_eq!(strip_start_code(&[0, 0, 0, 1, 7]).unwrap(), &[7]);
        assert_eq!(strip_start_code(&[0, 0, 1, 7]).unwrap(), &[7]);
        assert!(strip_start_code(&[0, 1, 7]).is_err());
    }

    #[test]
    fn test_first_slice_flag() {
        assert_eq!(first_slice_segment_in_pic(&[0x26, 0x01, 0x80]), Some(true));
        assert_eq!(first_slice_segment_in_pic(&[0x02, 0x01, 0x40]), Some(false));
        assert_eq!(first_slice_segment_in_pic(&[0x44, 0x01, 0x80]), None);
    }

    #[test]
    fn test_header_bytes_roundtrip() {
        let bytes = nal_header_bytes(NalUnitType::PpsNut);
        assert_eq!(bytes, [0x44, 0x01]);
        let header = parse_nal_header(&bytes).unwrap();
        assert_eq!(header.nal_type, NalUnitType::PpsNut);
        assert_eq!(header.nuh_layer_id, 0);
    }
}
