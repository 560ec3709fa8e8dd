//! Filesystem catalog of tiled video entries.
//!
//! Each entry is a directory under the catalog root named after the video.
//! The current layout version is kept in a small text file and only ever
//! increases; it is rewritten by staging a temporary file in the same
//! directory and renaming it over the old one.

use crate::tiles::TileLocationProvider;
use crate::{Error, Result};
use panotile_common::{paths, LayoutVersion};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Root directory holding one subdirectory per entry.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    /// Open (creating if needed) a catalog rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self, name: &str) -> bool {
        self.root.join(name).is_dir()
    }

    /// Resolve (creating if needed) the entry `name`.
    ///
    /// `metadata_identifier` is the key under which the entry's boxes are
    /// found in the semantic index; it defaults to the entry name.
    pub fn entry(&self, name: &str, metadata_identifier: Option<&str>) -> Result<TiledEntry> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::invalid_argument(format!("invalid entry name '{name}'")));
        }
        let directory = self.root.join(name);
        fs::create_dir_all(&directory)?;
        Ok(TiledEntry {
            name: name.to_string(),
            metadata_identifier: metadata_identifier.unwrap_or(name).to_string(),
            directory,
        })
    }

    /// Names of all entries, sorted.
    pub fn entries(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            if dirent.file_type()?.is_dir() {
                if let Some(name) = dirent.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// One tiled video in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiledEntry {
    name: String,
    metadata_identifier: String,
    directory: PathBuf,
}

impl TiledEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata_identifier(&self) -> &str {
        &self.metadata_identifier
    }

    /// Directory holding every version's files.
    pub fn version_directory(&self) -> &Path {
        &self.directory
    }

    /// Current layout version; 0 when nothing has been stored.
    pub fn tile_layout_version(&self) -> Result<LayoutVersion> {
        paths::read_version(&self.directory).map_err(|e| match e {
            panotile_common::Error::InvalidVersion { .. } => Error::CorruptVersion {
                entry: self.name.clone(),
                version: LayoutVersion::default(),
                reason: e.to_string(),
            },
            other => other.into(),
        })
    }

    pub fn is_stored(&self) -> Result<bool> {
        Ok(self.tile_layout_version()?.get() > 0)
    }

    /// Version the next store or retile will write.
    pub fn next_tile_layout_version(&self) -> Result<LayoutVersion> {
        Ok(self.tile_layout_version()?.next())
    }

    /// Bump the current version by one and persist it atomically.
    pub fn increment_tile_version(&self) -> Result<LayoutVersion> {
        let next = self.next_tile_layout_version()?;
        let mut file = tempfile::NamedTempFile::new_in(&self.directory)?;
        write!(file, "{}", next.get())?;
        file.flush()?;
        file.persist(paths::version_filename(&self.directory))
            .map_err(|e| Error::Io(e.error))?;
        tracing::info!(entry = %self.name, version = %next, "Published tile layout version");
        Ok(next)
    }

    pub fn metadata_path(&self, version: LayoutVersion) -> PathBuf {
        paths::metadata_filename(&self.directory, version)
    }

    pub fn stream_path(&self, version: LayoutVersion, index: u32) -> PathBuf {
        paths::stream_filename(&self.directory, version, index)
    }

    pub fn layout_path(&self, version: LayoutVersion) -> PathBuf {
        paths::layout_filename(&self.directory, version)
    }

    /// Location provider for the current version.
    pub fn location_provider(&self) -> Result<TileLocationProvider> {
        let version = self.tile_layout_version()?;
        if version.get() == 0 {
            return Err(Error::NotStored(self.name.clone()));
        }
        TileLocationProvider::load(&self.directory, version)
    }

    /// Delete every file written for `version`. Used to discard a version
    /// that was never published.
    pub fn remove_version(&self, version: LayoutVersion) -> Result<usize> {
        let mut removed = 0;
        for dirent in fs::read_dir(&self.directory)? {
            let path = dirent?.path();
            if paths::version_of(&path) == Some(version) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        tracing::debug!(entry = %self.name, %version, removed, "Removed layout version files");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_new_entry_has_version_zero() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        let entry = catalog.entry("pano", None).unwrap();
        assert_eq!(entry.metadata_identifier(), "pano");
        assert_eq!(entry.tile_layout_version().unwrap(), LayoutVersion::new(0));
        assert!(!entry.is_stored().unwrap());
        assert_matches!(entry.location_provider(), Err(Error::NotStored(_)));
    }

    #[test]
    fn test_increment_persists() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        let entry = catalog.entry("pano", Some("pano-detections")).unwrap();

        assert_eq!(entry.increment_tile_version().unwrap(), LayoutVersion::new(1));
        assert_eq!(entry.increment_tile_version().unwrap(), LayoutVersion::new(2));

        let reopened = Catalog::open(dir.path()).unwrap().entry("pano", None).unwrap();
        assert_eq!(reopened.tile_layout_version().unwrap(), LayoutVersion::new(2));
        let content = fs::read_to_string(dir.path().join("pano/tile-version")).unwrap();
        assert_eq!(content, "2");
    }

    #[test]
    fn test_corrupt_version_file() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        let entry = catalog.entry("pano", None).unwrap();
        fs::write(entry.version_directory().join("tile-version"), "three").unwrap();
        assert_matches!(entry.tile_layout_version(), Err(Error::CorruptVersion { .. }));
    }

    #[test]
    fn test_entries_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        catalog.entry("b", None).unwrap();
        catalog.entry("a", None).unwrap();
        assert_eq!(catalog.entries().unwrap(), vec!["a", "b"]);
        assert!(catalog.exists("a"));
        assert!(catalog.entry("../escape", None).is_err());
    }

    #[test]
    fn test_remove_version() {
        let dir = tempfile::tempdir().unwrap();
        let entry = Catalog::open(dir.path()).unwrap().entry("pano", None).unwrap();
        let v1 = LayoutVersion::new(1);
        let v2 = LayoutVersion::new(2);
        fs::write(entry.stream_path(v1, 0), b"a").unwrap();
        fs::write(entry.stream_path(v2, 0), b"b").unwrap();
        fs::write(entry.metadata_path(v2), b"c").unwrap();

        assert_eq!(entry.remove_version(v2).unwrap(), 2);
        assert!(entry.stream_path(v1, 0).exists());
        assert!(!entry.metadata_path(v2).exists());
    }
}
