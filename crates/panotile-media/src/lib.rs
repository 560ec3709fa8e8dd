//! Panotile-Media: picture and GOP access to tile elementary streams
//!
//! Tile files are HEVC Annex B elementary streams, one per tile and layout
//! span. This crate indexes them so the scan and stitch operators can address
//! pictures by frame number and read whole GOPs without decoding.
//!
//! # Modules
//!
//! - `gop` - Picture boundaries, keyframes, and GOP grouping
//! - `reader` - In-memory frame reader handing out zero-copy slices

pub mod error;
pub mod gop;
pub mod reader;

pub use error::{Error, Result};
pub use gop::{Gop, GopIndex, PictureEntry};
pub use reader::{EncodedFrameReader, EncodedNal, EncodedPicture};
