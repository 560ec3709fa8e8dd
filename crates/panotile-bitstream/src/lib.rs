//! # panotile-bitstream
//!
//! Encoded-domain access to HEVC Annex B streams.
//!
//! This crate provides:
//! - Start-code framing and NAL header parsing
//! - Emulation-prevention removal and re-insertion that round-trips bit-exactly
//! - In-place rewriting of picture parameter set fields (tile grid, ids)
//! - Sequence parameter set parsing up to the CTB size
//! - Slice header PPS reference rewriting
//!
//! ## Example
//!
//! ```no_run
//! use panotile_bitstream::ParameterSet;
//!
//! # fn example(pps_nal: &[u8]) -> panotile_bitstream::Result<()> {
//! let mut pps = ParameterSet::parse(pps_nal)?;
//! pps.set_tile_dimensions(2, 2, false)?;
//! let framed: &[u8] = pps.bytes();
//! # let _ = framed;
//! # Ok(())
//! # }
//! ```

pub mod bits;
pub mod emulation;
pub mod error;
pub mod nal;
pub mod parameter_set;
pub mod sequence;
pub mod slice;
pub mod writer;

#[cfg(any(test, feature = "synth"))]
pub mod synth;

pub use bits::{ue_width, BitArray, BitReader};
pub use emulation::{insert_escapes_and_marker, remove_escapes, validate_escapes};
pub use error::{BitstreamError, Result};
pub use nal::{split_nal_units, NalHeader, NalUnit, NalUnitType, NAL_HEADER_SIZE, START_CODE};
pub use parameter_set::ParameterSet;
pub use sequence::SequenceParameterSet;
pub use slice::SliceHeader;
pub use writer::RbspWriter;
