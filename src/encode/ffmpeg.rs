//! Tile encoding with the ffmpeg and ffprobe command-line tools.

use super::{TileEncodeRequest, TileEncoder, TileOutput};
use crate::config::EncoderConfig;
use crate::tools;
use crate::{Error, Result};
use bytes::Bytes;
use panotile_bitstream::START_CODE;
use panotile_common::{paths, VideoGeometry};
use panotile_media::EncodedFrameReader;
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

/// Parse `ffprobe -of json` output for the first video stream.
fn parse_probe_output(json: &str) -> Result<VideoGeometry> {
    let output: FfprobeOutput = serde_json::from_str(json)?;
    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| Error::tool_failed("ffprobe", "no video stream"))?;

    let frame_count = stream
        .nb_read_packets
        .or(stream.nb_frames)
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| Error::tool_failed("ffprobe", "frame count unavailable"))?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(VideoGeometry {
            width,
            height,
            frame_count,
        }),
        _ => Err(Error::tool_failed("ffprobe", "video stream has no dimensions")),
    }
}

/// [`TileEncoder`] running one ffmpeg process per tile.
#[derive(Debug, Clone)]
pub struct FfmpegTileEncoder {
    config: EncoderConfig,
}

impl FfmpegTileEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    fn ffmpeg(&self) -> Result<PathBuf> {
        tools::resolve("ffmpeg", self.config.ffmpeg_path.as_deref())
    }

    fn ffprobe(&self) -> Result<PathBuf> {
        tools::resolve("ffprobe", self.config.ffprobe_path.as_deref())
    }

    /// Codec options shared by tile and header encodes.
    fn codec_args(&self, gop_length: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-an".into(),
            "-c:v".into(),
            self.config.codec.clone().into(),
            "-preset".into(),
            self.config.preset.clone().into(),
            "-g".into(),
            gop_length.to_string().into(),
            "-keyint_min".into(),
            gop_length.to_string().into(),
        ];
        if self.config.codec == "libx265" {
            let mut params = format!(
                "keyint={gop_length}:min-keyint={gop_length}:scenecut=0:repeat-headers=1:crf={}",
                self.config.quality
            );
            if let Some(extra) = &self.config.codec_params {
                params.push(':');
                params.push_str(extra);
            }
            args.push("-x265-params".into());
            args.push(params.into());
        } else if let Some(extra) = &self.config.codec_params {
            // e.g. -kvazaar-params for libkvazaar
            let codec = self.config.codec.trim_start_matches("lib");
            args.push(format!("-{codec}-params").into());
            args.push(extra.into());
        }
        args.push("-f".into());
        args.push("hevc".into());
        args
    }

    /// Arguments encoding one tile of `request` into `target`.
    fn tile_args(&self, request: &TileEncodeRequest, tile: &TileOutput, target: &Path) -> Vec<OsString> {
        let r = tile.rectangle;
        let filter = format!(
            "trim=start_frame={}:end_frame={},setpts=PTS-STARTPTS,crop={}:{}:{}:{}",
            request.first_frame, request.last_frame, r.width, r.height, r.x, r.y
        );
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            request.source.clone().into(),
            "-vf".into(),
            filter.into(),
            "-frames:v".into(),
            request.frame_count().to_string().into(),
        ];
        args.extend(self.codec_args(request.gop_length));
        args.push(target.into());
        args
    }

    fn run(&self, tool: &str, program: &Path, args: &[OsString]) -> Result<Vec<u8>> {
        tracing::debug!(tool, ?args, "Running");
        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(tool)
            } else {
                Error::Io(e)
            }
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::tool_failed(tool, stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    /// Run ffmpeg into a staging file and rename it over `path` on success.
    fn encode_to(&self, ffmpeg: &Path, path: &Path, args: impl FnOnce(&Path) -> Vec<OsString>) -> Result<()> {
        let staging = paths::temporary_filename(path);
        match self.run("ffmpeg", ffmpeg, &args(&staging)) {
            Ok(_) => {
                fs::rename(&staging, path)?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&staging);
                Err(e)
            }
        }
    }
}

impl TileEncoder for FfmpegTileEncoder {
    fn probe(&self, source: &Path) -> Result<VideoGeometry> {
        let ffprobe = self.ffprobe()?;
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-count_packets".into(),
            "-show_entries".into(),
            "stream=width,height,nb_frames,nb_read_packets".into(),
            "-of".into(),
            "json".into(),
            source.into(),
        ];
        let stdout = self.run("ffprobe", &ffprobe, &args)?;
        let json = String::from_utf8(stdout)
            .map_err(|e| Error::tool_failed("ffprobe", format!("Invalid UTF-8: {e}")))?;
        let geometry = parse_probe_output(&json)?;
        tracing::debug!(
            source = %source.display(),
            width = geometry.width,
            height = geometry.height,
            frames = geometry.frame_count,
            "Probed source"
        );
        Ok(geometry)
    }

    fn encode_tiles(&self, request: &TileEncodeRequest) -> Result<()> {
        let ffmpeg = self.ffmpeg()?;
        for tile in &request.outputs {
            self.encode_to(&ffmpeg, &tile.path, |staging| {
                self.tile_args(request, tile, staging)
            })?;
            tracing::debug!(
                tile = %tile.rectangle,
                path = %tile.path.display(),
                "Encoded tile"
            );
        }
        tracing::info!(
            source = %request.source.display(),
            tiles = request.outputs.len(),
            first_frame = request.first_frame,
            last_frame = request.last_frame,
            "Encoded tile streams"
        );
        Ok(())
    }

    fn encode_header(&self, source: &Path, output: &Path) -> Result<()> {
        let ffmpeg = self.ffmpeg()?;
        let full_frame = paths::temporary_filename(&output.with_extension("full"));
        self.encode_to(&ffmpeg, &full_frame, |staging| {
            let mut args: Vec<OsString> = vec![
                "-y".into(),
                "-v".into(),
                "error".into(),
                "-i".into(),
                source.into(),
                "-frames:v".into(),
                "1".into(),
            ];
            args.extend(self.codec_args(1));
            args.push(staging.into());
            args
        })?;

        let encoded = fs::read(&full_frame);
        let _ = fs::remove_file(&full_frame);
        let reader = EncodedFrameReader::from_bytes(Bytes::from(encoded?))?;

        let mut header = Vec::new();
        for nal in reader.parameter_sets() {
            header.extend_from_slice(&START_CODE);
            header.extend_from_slice(&nal.data);
        }
        let staging = paths::temporary_filename(output);
        fs::write(&staging, &header)?;
        fs::rename(&staging, output)?;
        tracing::debug!(output = %output.display(), bytes = header.len(), "Wrote full-frame header");
        Ok(())
    }
}
