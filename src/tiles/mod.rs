//! Tile layouts and their on-disk locations.
//!
//! - `layout` - Row/column grids and rectangle-list validation
//! - `manifest` - Per-version span list persisted as `<version>-layout.json`
//! - `provider` - Frame and tile index to stream file lookup
//! - `fit` - Non-uniform layouts fitted to object boxes

pub mod fit;
mod layout;
mod manifest;
mod provider;

pub use fit::LayoutFitter;
pub use layout::TileLayout;
pub use manifest::{LayoutSpan, VersionManifest};
pub use provider::{TileInformation, TileLocationProvider};
