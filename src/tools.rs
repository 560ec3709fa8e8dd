//! Locating and checking the ffmpeg tools the encoder shells out to.

use crate::config::EncoderConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// What `check-tools` found for one executable.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub name: &'static str,
    /// Resolved executable, if any.
    pub path: Option<PathBuf>,
    /// First line of `-version` output; `None` when the tool did not run.
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }
}

/// Resolve `name`, preferring a configured path that exists over a PATH lookup.
pub fn resolve(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) if path.exists() => return Ok(path.to_path_buf()),
        Some(path) => tracing::warn!(
            tool = name,
            path = %path.display(),
            "Configured tool path does not exist, searching PATH"
        ),
        None => {}
    }
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

fn check_tool(name: &'static str, configured: Option<&Path>) -> ToolStatus {
    let path = resolve(name, configured).ok();
    let version = path.as_ref().and_then(|path| {
        let output = Command::new(path).arg("-version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(str::to_string)
    });
    ToolStatus {
        name,
        path,
        version,
    }
}

/// Whether `ffmpeg -encoders` lists `codec`.
pub fn supports_codec(ffmpeg: &Path, codec: &str) -> bool {
    Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|output| output.status.success() && lists_encoder(&String::from_utf8_lossy(&output.stdout), codec))
        .unwrap_or(false)
}

/// Encoder lines look like ` V....D libx265   libx265 H.265 / HEVC`.
fn lists_encoder(listing: &str, codec: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == codec)
}

/// Check ffmpeg and ffprobe as the encoder would find them.
pub fn check_encoder_tools(config: &EncoderConfig) -> Vec<ToolStatus> {
    vec![
        check_tool("ffmpeg", config.ffmpeg_path.as_deref()),
        check_tool("ffprobe", config.ffprobe_path.as_deref()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_unavailable() {
        let status = check_tool("nonexistent_tool_12345", None);
        assert!(!status.is_available());
        assert!(status.path.is_none());
    }

    #[test]
    fn resolve_falls_back_to_path() {
        assert!(matches!(
            resolve("nonexistent_tool_12345", None),
            Err(Error::ToolNotFound(_))
        ));
        assert!(resolve("nonexistent_tool_12345", Some(Path::new("/nonexistent/bin"))).is_err());
    }

    #[test]
    fn configured_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(resolve("ffmpeg", Some(file.path())).unwrap(), file.path());
    }

    #[test]
    fn encoder_listing_matches_whole_names() {
        let listing = "Encoders:\n V..... = Video\n ------\n V....D libx265              libx265 H.265 / HEVC (codec hevc)\n V....D hevc_nvenc           NVIDIA NVENC hevc encoder (codec hevc)\n";
        assert!(lists_encoder(listing, "libx265"));
        assert!(lists_encoder(listing, "hevc_nvenc"));
        assert!(!lists_encoder(listing, "libx26"));
        assert!(!lists_encoder(listing, "libkvazaar"));
    }
}
