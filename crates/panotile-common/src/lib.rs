//! Panotile-Common: Shared types, geometry, and utilities.
//!
//! This crate provides common functionality used across panotile:
//!
//! - **Geometry**: The `Rectangle` type used for tiles and object bounding boxes
//! - **Typed IDs**: Layout versions and retile job identifiers
//! - **Core Types**: Selection strategies and video geometry
//! - **Path Utilities**: Naming of the files that make up a tiled catalog entry
//! - **Errors**: Failures reading an entry's version file
//!
//! # Examples
//!
//! ```
//! use panotile_common::{LayoutVersion, Rectangle};
//! use panotile_common::paths::{read_version, stream_filename};
//! use std::path::Path;
//!
//! let tile = Rectangle::new(0, 160, 0, 160, 120);
//! let object = Rectangle::new(7, 170, 10, 20, 20);
//! assert!(tile.contains(&object));
//!
//! let version = LayoutVersion::new(1);
//! let path = stream_filename(Path::new("catalog/traffic"), version, 3);
//! assert!(path.ends_with("1-3-stream.mp4"));
//!
//! let empty = std::env::temp_dir().join("panotile-doc-unstored");
//! assert_eq!(read_version(&empty).unwrap(), LayoutVersion::default());
//! ```

pub mod error;
pub mod geometry;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use geometry::Rectangle;
pub use ids::*;
pub use types::*;
