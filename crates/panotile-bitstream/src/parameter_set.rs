//! HEVC picture parameter set (7.3.2.3) with in-place field rewriting.
//!
//! Only the fields needed to stitch tiles are located: the parameter-set ids,
//! cabac_init_present_flag, the tile grid, and the flags that decide whether
//! slice headers carry entry points. Everything after the tile block is
//! carried through untouched.
//!
//! A rewrite never grows a field. Writing a value whose codeword is wider
//! than the one it replaces fails with [`BitstreamError::FieldWidthOverflow`];
//! a narrower codeword is spliced in and the RBSP trailing bits re-aligned.

use crate::bits::{ue_width, BitArray, BitReader};
use crate::emulation::{insert_escapes_and_marker, remove_escapes};
use crate::nal::{strip_start_code, NalUnitType, NAL_HEADER_SIZE};
use crate::writer::RbspWriter;
use crate::{BitstreamError, Result};
use std::cell::OnceCell;

/// Highest value of pps_pic_parameter_set_id.
pub const MAX_PPS_ID: u32 = 63;

const HEADER_BITS: usize = NAL_HEADER_SIZE * 8;

/// Location of a syntax element inside the unescaped payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Field {
    pub offset: usize,
    pub width: usize,
    pub value: u32,
}

impl Field {
    pub fn end(&self) -> usize {
        self.offset + self.width
    }
}

pub(crate) fn read_ue_field(reader: &mut BitReader<'_>, name: &'static str) -> Result<Field> {
    let offset = reader.position();
    let value = reader
        .read_ue()
        .ok_or_else(|| BitstreamError::truncated(name))?;
    Ok(Field {
        offset,
        width: reader.position() - offset,
        value,
    })
}

pub(crate) fn read_flag(reader: &mut BitReader<'_>, name: &'static str) -> Result<bool> {
    reader
        .read_flag()
        .ok_or_else(|| BitstreamError::truncated(name))
}

pub(crate) fn skip_ue(reader: &mut BitReader<'_>, name: &'static str) -> Result<()> {
    reader
        .read_ue()
        .map(|_| ())
        .ok_or_else(|| BitstreamError::truncated(name))
}

fn skip_se(reader: &mut BitReader<'_>, name: &'static str) -> Result<()> {
    reader
        .read_se()
        .map(|_| ())
        .ok_or_else(|| BitstreamError::truncated(name))
}

pub(crate) fn nal_type_of(bits: &BitArray) -> Result<NalUnitType> {
    let raw = bits
        .read(1, 6)
        .ok_or_else(|| BitstreamError::truncated("nal_unit_type"))?;
    Ok(NalUnitType::from(raw as u8))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TileFields {
    columns_minus1: Field,
    rows_minus1: Field,
    uniform_spacing: bool,
    /// Signalled sizes in CTBs; the last column and row are implicit.
    column_widths: Vec<u32>,
    row_heights: Vec<u32>,
    loop_filter_offset: usize,
    loop_filter_across_tiles: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PpsFields {
    pps_id: Field,
    sps_id: Field,
    cabac_init_present: bool,
    tiles_enabled_offset: usize,
    entropy_coding_sync: bool,
    tiles: Option<TileFields>,
}

fn parse_fields(bits: &BitArray) -> Result<PpsFields> {
    let nal_type = nal_type_of(bits)?;
    if nal_type != NalUnitType::PpsNut {
        return Err(BitstreamError::UnexpectedNalType {
            expected: "PPS",
            found: u8::from(nal_type),
        });
    }

    let mut r = BitReader::at(bits, HEADER_BITS);
    let pps_id = read_ue_field(&mut r, "pps_pic_parameter_set_id")?;
    let sps_id = read_ue_field(&mut r, "pps_seq_parameter_set_id")?;
    read_flag(&mut r, "dependent_slice_segments_enabled_flag")?;
    read_flag(&mut r, "output_flag_present_flag")?;
    r.skip(3)
        .ok_or_else(|| BitstreamError::truncated("num_extra_slice_header_bits"))?;
    read_flag(&mut r, "sign_data_hiding_enabled_flag")?;
    let cabac_init_present = read_flag(&mut r, "cabac_init_present_flag")?;
    skip_ue(&mut r, "num_ref_idx_l0_default_active_minus1")?;
    skip_ue(&mut r, "num_ref_idx_l1_default_active_minus1")?;
    skip_se(&mut r, "init_qp_minus26")?;
    read_flag(&mut r, "constrained_intra_pred_flag")?;
    read_flag(&mut r, "transform_skip_enabled_flag")?;
    if read_flag(&mut r, "cu_qp_delta_enabled_flag")? {
        skip_ue(&mut r, "diff_cu_qp_delta_depth")?;
    }
    skip_se(&mut r, "pps_cb_qp_offset")?;
    skip_se(&mut r, "pps_cr_qp_offset")?;
    read_flag(&mut r, "pps_slice_chroma_qp_offsets_present_flag")?;
    read_flag(&mut r, "weighted_pred_flag")?;
    read_flag(&mut r, "weighted_bipred_flag")?;
    read_flag(&mut r, "transquant_bypass_enabled_flag")?;

    let tiles_enabled_offset = r.position();
    let tiles_enabled = read_flag(&mut r, "tiles_enabled_flag")?;
    let entropy_coding_sync = read_flag(&mut r, "entropy_coding_sync_enabled_flag")?;

    let tiles = if tiles_enabled {
        let columns_minus1 = read_ue_field(&mut r, "num_tile_columns_minus1")?;
        let rows_minus1 = read_ue_field(&mut r, "num_tile_rows_minus1")?;
        let uniform_spacing = read_flag(&mut r, "uniform_spacing_flag")?;
        let mut column_widths = Vec::new();
        let mut row_heights = Vec::new();
        if !uniform_spacing {
            for _ in 0..columns_minus1.value {
                column_widths.push(read_ue_field(&mut r, "column_width_minus1")?.value + 1);
            }
            for _ in 0..rows_minus1.value {
                row_heights.push(read_ue_field(&mut r, "row_height_minus1")?.value + 1);
            }
        }
        let loop_filter_offset = r.position();
        let loop_filter_across_tiles =
            read_flag(&mut r, "loop_filter_across_tiles_enabled_flag")?;
        Some(TileFields {
            columns_minus1,
            rows_minus1,
            uniform_spacing,
            column_widths,
            row_heights,
            loop_filter_offset,
            loop_filter_across_tiles,
        })
    } else {
        None
    };

    Ok(PpsFields {
        pps_id,
        sps_id,
        cabac_init_present,
        tiles_enabled_offset,
        entropy_coding_sync,
        tiles,
    })
}

/// A picture parameter set held as unescaped bits.
///
/// The escaped, start-code-framed form is computed on first use and cached
/// until the next write.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    bits: BitArray,
    fields: PpsFields,
    framed: OnceCell<(Vec<u8>, usize)>,
}

impl ParameterSet {
    /// Parse a PPS NAL unit. A leading start code is optional.
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let data = strip_start_code(nal).unwrap_or(nal);
        if data.len() < NAL_HEADER_SIZE {
            return Err(BitstreamError::ShortNalUnit {
                offset: 0,
                len: data.len(),
            });
        }
        Self::from_bits(remove_escapes(data, NAL_HEADER_SIZE, data.len()))
    }

    /// Interpret already-unescaped bits (header included) as a PPS.
    pub fn from_bits(bits: BitArray) -> Result<Self> {
        let fields = parse_fields(&bits)?;
        Ok(Self {
            bits,
            fields,
            framed: OnceCell::new(),
        })
    }

    pub fn parameter_set_id(&self) -> u32 {
        self.fields.pps_id.value
    }

    pub fn seq_parameter_set_id(&self) -> u32 {
        self.fields.sps_id.value
    }

    pub fn tiles_enabled(&self) -> bool {
        self.fields.tiles.is_some()
    }

    /// Tile grid as `(rows, columns)`; `(1, 1)` when tiles are disabled.
    pub fn tile_dimensions(&self) -> (u32, u32) {
        self.fields.tiles.as_ref().map_or((1, 1), |t| {
            (t.rows_minus1.value + 1, t.columns_minus1.value + 1)
        })
    }

    pub fn uniform_spacing(&self) -> bool {
        self.fields.tiles.as_ref().map_or(true, |t| t.uniform_spacing)
    }

    /// Explicit `(column_widths, row_heights)` in CTBs, without the implicit
    /// last column and row. `None` for uniform spacing or no tiles.
    pub fn explicit_tile_sizes(&self) -> Option<(&[u32], &[u32])> {
        self.fields
            .tiles
            .as_ref()
            .filter(|t| !t.uniform_spacing)
            .map(|t| (t.column_widths.as_slice(), t.row_heights.as_slice()))
    }

    pub fn loop_filter_across_tiles_enabled(&self) -> Option<bool> {
        self.fields.tiles.as_ref().map(|t| t.loop_filter_across_tiles)
    }

    /// Slice headers carry entry points when tiles or wavefronts are enabled.
    pub fn has_entry_point_offsets(&self) -> bool {
        self.fields.tiles.is_some() || self.fields.entropy_coding_sync
    }

    pub fn cabac_init_present_flag(&self) -> bool {
        self.fields.cabac_init_present
    }

    /// Rewrite pps_pic_parameter_set_id.
    pub fn set_parameter_set_id(&mut self, id: u32) -> Result<()> {
        if id > MAX_PPS_ID {
            return Err(BitstreamError::InvalidFieldValue {
                field: "pps_pic_parameter_set_id",
                value: id,
            });
        }
        let field = self.fields.pps_id;
        if field.value == id {
            return Ok(());
        }

        let required = ue_width(id);
        if required > field.width {
            return Err(BitstreamError::overflow(
                "pps_pic_parameter_set_id",
                field.width,
                required,
            ));
        }

        let mut writer = RbspWriter::new();
        writer.write_ue(id)?;
        let codeword = writer.into_bits()?;
        self.replace(field.offset..field.end(), &codeword)
    }

    /// Rewrite the tile grid to `rows` x `columns` with uniform spacing.
    ///
    /// A 1x1 grid clears tiles_enabled_flag. A PPS without a tile grid has no
    /// room for one, so anything larger overflows.
    pub fn set_tile_dimensions(
        &mut self,
        rows: u32,
        columns: u32,
        loop_filter_enabled: bool,
    ) -> Result<()> {
        self.write_tile_grid(rows, columns, None, loop_filter_enabled)
    }

    /// Rewrite the tile grid with explicit sizes in CTBs.
    ///
    /// `column_widths` and `row_heights` hold every column and row but the
    /// last, which takes the remainder of the picture. The grid counts obey
    /// the same width rule as [`ParameterSet::set_tile_dimensions`]; the size
    /// lists replace whatever the PPS signalled before and may lengthen it.
    pub fn set_explicit_tile_spacing(
        &mut self,
        column_widths: &[u32],
        row_heights: &[u32],
        loop_filter_enabled: bool,
    ) -> Result<()> {
        if let Some(&zero) = column_widths.iter().find(|&&w| w == 0) {
            return Err(BitstreamError::InvalidFieldValue {
                field: "column_width_minus1",
                value: zero,
            });
        }
        if let Some(&zero) = row_heights.iter().find(|&&h| h == 0) {
            return Err(BitstreamError::InvalidFieldValue {
                field: "row_height_minus1",
                value: zero,
            });
        }
        let rows = row_heights.len() as u32 + 1;
        let columns = column_widths.len() as u32 + 1;
        self.write_tile_grid(rows, columns, Some((column_widths, row_heights)), loop_filter_enabled)
    }

    fn write_tile_grid(
        &mut self,
        rows: u32,
        columns: u32,
        explicit: Option<(&[u32], &[u32])>,
        loop_filter_enabled: bool,
    ) -> Result<()> {
        if rows == 0 {
            return Err(BitstreamError::InvalidFieldValue {
                field: "num_tile_rows_minus1",
                value: rows,
            });
        }
        if columns == 0 {
            return Err(BitstreamError::InvalidFieldValue {
                field: "num_tile_columns_minus1",
                value: columns,
            });
        }

        let Some(tiles) = self.fields.tiles.as_ref() else {
            if rows == 1 && columns == 1 {
                return Ok(());
            }
            return Err(if columns > 1 {
                BitstreamError::overflow("num_tile_columns_minus1", 0, ue_width(columns - 1))
            } else {
                BitstreamError::overflow("num_tile_rows_minus1", 0, ue_width(rows - 1))
            });
        };
        let (columns_field, rows_field) = (tiles.columns_minus1, tiles.rows_minus1);
        let block = columns_field.offset..tiles.loop_filter_offset + 1;

        if rows == 1 && columns == 1 {
            self.bits.set(self.fields.tiles_enabled_offset, false);
            return self.replace(block, &BitArray::new());
        }

        let required = ue_width(columns - 1);
        if required > columns_field.width {
            return Err(BitstreamError::overflow(
                "num_tile_columns_minus1",
                columns_field.width,
                required,
            ));
        }
        let required = ue_width(rows - 1);
        if required > rows_field.width {
            return Err(BitstreamError::overflow(
                "num_tile_rows_minus1",
                rows_field.width,
                required,
            ));
        }

        let mut writer = RbspWriter::new();
        writer.write_ue(columns - 1)?;
        writer.write_ue(rows - 1)?;
        writer.write_flag(explicit.is_none())?;
        if let Some((column_widths, row_heights)) = explicit {
            for &width in column_widths {
                writer.write_ue(width - 1)?;
            }
            for &height in row_heights {
                writer.write_ue(height - 1)?;
            }
        }
        writer.write_flag(loop_filter_enabled)?;
        let replacement = writer.into_bits()?;
        self.replace(block, &replacement)
    }

    /// Unescaped bits, header included.
    pub fn bits(&self) -> &BitArray {
        &self.bits
    }

    /// Escaped bytes with a leading four-byte start code.
    pub fn bytes(&self) -> &[u8] {
        &self.framed().0
    }

    /// Escape bytes added when producing [`ParameterSet::bytes`].
    pub fn inserted_escapes(&self) -> usize {
        self.framed().1
    }

    fn framed(&self) -> &(Vec<u8>, usize) {
        self.framed.get_or_init(|| {
            insert_escapes_and_marker(&self.bits, NAL_HEADER_SIZE, self.bits.byte_len(), false)
        })
    }

    fn replace(&mut self, range: std::ops::Range<usize>, replacement: &BitArray) -> Result<()> {
        let resized = replacement.len() != range.end - range.start;
        self.bits.splice(range, replacement);
        if resized {
            self.bits.realign_trailing_bits();
        }
        self.fields = parse_fields(&self.bits)?;
        self.framed = OnceCell::new();
        Ok(())
    }
}
