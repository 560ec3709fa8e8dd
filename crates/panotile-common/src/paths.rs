//! File naming for tiled catalog entries.
//!
//! Every entry directory holds, per layout version:
//!
//! - `<version>-metadata.mp4`: the full-frame parameter-set header
//! - `<version>-<index>-stream.mp4`: one tile stream per global tile index
//! - `<version>-layout.json`: the version manifest
//!
//! plus a single `tile-version` file holding the current version number.

use crate::{Error, LayoutVersion, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const VERSION_FILENAME: &str = "tile-version";
const METADATA_SUFFIX: &str = "-metadata.mp4";
const STREAM_SUFFIX: &str = "-stream.mp4";
const LAYOUT_SUFFIX: &str = "-layout.json";
const TEMPORARY_EXTENSION: &str = "tmp";

/// Path of the full-frame header for `version`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use panotile_common::{paths::metadata_filename, LayoutVersion};
///
/// let p = metadata_filename(Path::new("/catalog/birds"), LayoutVersion::new(2));
/// assert_eq!(p, Path::new("/catalog/birds/2-metadata.mp4"));
/// ```
pub fn metadata_filename(dir: &Path, version: LayoutVersion) -> PathBuf {
    dir.join(format!("{version}{METADATA_SUFFIX}"))
}

/// Path of the tile stream with global index `index` for `version`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use panotile_common::{paths::stream_filename, LayoutVersion};
///
/// let p = stream_filename(Path::new("/catalog/birds"), LayoutVersion::new(1), 3);
/// assert_eq!(p, Path::new("/catalog/birds/1-3-stream.mp4"));
/// ```
pub fn stream_filename(dir: &Path, version: LayoutVersion, index: u32) -> PathBuf {
    dir.join(format!("{version}-{index}{STREAM_SUFFIX}"))
}

/// Path of the manifest describing `version`.
pub fn layout_filename(dir: &Path, version: LayoutVersion) -> PathBuf {
    dir.join(format!("{version}{LAYOUT_SUFFIX}"))
}

/// Path of the file holding the current version number.
pub fn version_filename(dir: &Path) -> PathBuf {
    dir.join(VERSION_FILENAME)
}

/// Read the current version from an entry directory's `tile-version` file.
///
/// A missing file means nothing has been stored yet and reads as version 0.
pub fn read_version(dir: &Path) -> Result<LayoutVersion> {
    let path = version_filename(dir);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LayoutVersion::default()),
        Err(e) => return Err(e.into()),
    };
    let text = content.trim();
    text.parse::<u32>()
        .map(LayoutVersion::new)
        .map_err(|source| Error::InvalidVersion {
            path,
            text: text.to_string(),
            source,
        })
}

/// Staging path next to `path`, renamed into place once fully written.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use panotile_common::paths::temporary_filename;
///
/// let p = temporary_filename(Path::new("/c/1-0-stream.mp4"));
/// assert_eq!(p, Path::new("/c/1-0-stream.mp4.tmp"));
/// ```
pub fn temporary_filename(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(TEMPORARY_EXTENSION);
    PathBuf::from(name)
}

/// Parse `<version>-<index>-stream.mp4` back into its parts.
pub fn parse_stream_filename(path: &Path) -> Option<(LayoutVersion, u32)> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(STREAM_SUFFIX)?;
    let (version, index) = stem.split_once('-')?;
    Some((
        LayoutVersion::new(version.parse().ok()?),
        index.parse().ok()?,
    ))
}

/// Extract the version from any per-version file name in an entry directory.
pub fn version_of(path: &Path) -> Option<LayoutVersion> {
    let name = path.file_name()?.to_str()?;
    if name.ends_with(TEMPORARY_EXTENSION) {
        return None;
    }
    let (version, _) = name.split_once('-')?;
    version.parse().ok().map(LayoutVersion::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filenames() {
        let dir = Path::new("resources/red10");
        let v = LayoutVersion::new(1);
        assert_eq!(
            metadata_filename(dir, v),
            Path::new("resources/red10/1-metadata.mp4")
        );
        assert_eq!(
            stream_filename(dir, v, 0),
            Path::new("resources/red10/1-0-stream.mp4")
        );
        assert_eq!(
            layout_filename(dir, v),
            Path::new("resources/red10/1-layout.json")
        );
        assert_eq!(version_filename(dir), Path::new("resources/red10/tile-version"));
    }

    #[test]
    fn test_parse_stream_filename() {
        assert_eq!(
            parse_stream_filename(Path::new("/x/12-7-stream.mp4")),
            Some((LayoutVersion::new(12), 7))
        );
        assert_eq!(parse_stream_filename(Path::new("/x/12-metadata.mp4")), None);
        assert_eq!(parse_stream_filename(Path::new("/x/a-7-stream.mp4")), None);
        assert_eq!(parse_stream_filename(Path::new("/x/tile-version")), None);
    }

    #[test]
    fn test_version_of() {
        assert_eq!(
            version_of(Path::new("3-metadata.mp4")),
            Some(LayoutVersion::new(3))
        );
        assert_eq!(
            version_of(Path::new("3-1-stream.mp4")),
            Some(LayoutVersion::new(3))
        );
        assert_eq!(version_of(Path::new("3-1-stream.mp4.tmp")), None);
        assert_eq!(version_of(Path::new("tile-version")), None);
    }

    #[test]
    fn test_read_version() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_version(dir.path()).unwrap(), LayoutVersion::default());

        fs::write(version_filename(dir.path()), "3\n").unwrap();
        assert_eq!(read_version(dir.path()).unwrap(), LayoutVersion::new(3));

        fs::write(version_filename(dir.path()), "three").unwrap();
        assert!(matches!(
            read_version(dir.path()),
            Err(Error::InvalidVersion { text, .. }) if text == "three"
        ));
    }
}
