//! Panotile - Tiled panoramic video storage
//!
//! Videos are stored as independently encoded HEVC tile streams. Queries
//! over object detections read only the tiles holding the objects, or stitch
//! every tile back into full frames without re-encoding. Layouts adapt to the
//! query workload through regret-based retiling.
//!
//! This library crate exposes the engine used by the `panotile` binary and
//! the integration tests.

pub mod catalog;
pub mod config;
pub mod encode;
pub mod error;
pub mod manager;
pub mod operators;
pub mod regret;
pub mod semantic;
pub mod stitch;
pub mod tiles;
pub mod tools;

pub use error::{Error, LayoutError, Result};
pub use manager::VideoManager;
