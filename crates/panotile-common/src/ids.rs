//! Typed ID wrappers for type safety across panotile.
//!
//! Layout versions and retile jobs are both plain numbers or UUIDs underneath;
//! the newtypes keep them from being mixed with frame numbers or tile indices.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version of a tiled entry's layout.
///
/// Version 0 means nothing has been stored yet. Every publish bumps it by one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LayoutVersion(u32);

impl LayoutVersion {
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The version that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u32> for LayoutVersion {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

impl std::fmt::Display for LayoutVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a single retile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetileJobId(Uuid);

impl RetileJobId {
    /// Generate a new random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RetileJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RetileJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for RetileJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_version_next() {
        let v = LayoutVersion::default();
        assert_eq!(v.get(), 0);
        assert_eq!(v.next().get(), 1);
        assert!(v < v.next());
    }

    #[test]
    fn test_layout_version_serde_transparent() {
        let json = serde_json::to_string(&LayoutVersion::new(4)).unwrap();
        assert_eq!(json, "4");
        let back: LayoutVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LayoutVersion::new(4));
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(RetileJobId::new(), RetileJobId::new());
    }
}
