//! Integration tests for configuration loading.

use panotile::config::{load_config, load_config_or_default, validate_config, Config};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[test]
fn full_config_file_parses() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("panotile.toml");
    fs::write(
        &path,
        r#"
[catalog]
root = "/data/catalog"

[scan]
read_entire_gops = false
allow_degraded = true
sort_by_size = false

[retile]
automatic = true
threshold = 0.5
min_tile_width = 128
min_tile_height = 128
alignment = 32

[encoder]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
codec = "libkvazaar"
preset = "ultrafast"
quality = 32
gop_length = 60
codec_params = "tiles=4x4"

[semantic_index]
path = "/data/detections.json"
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.catalog.root, Path::new("/data/catalog"));

    let options = config.scan.options();
    assert!(!options.read_entire_gops);
    assert!(options.allow_degraded);
    assert!(!options.sort_by_size);
    assert!(!options.require_single_tile_objects);

    assert!(config.retile.automatic);
    assert_eq!(config.retile.threshold, 0.5);
    let fitter = config.retile.fitter();
    assert_eq!(fitter.min_tile_width, 128);
    assert_eq!(fitter.alignment, 32);

    assert_eq!(config.encoder.codec, "libkvazaar");
    assert_eq!(config.encoder.gop_length, 60);
    assert_eq!(config.encoder.codec_params.as_deref(), Some("tiles=4x4"));
    assert_eq!(
        config.semantic_index.path.as_deref(),
        Some(Path::new("/data/detections.json"))
    );
}

#[test]
fn empty_file_is_default() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("panotile.toml");
    fs::write(&path, "").unwrap();

    let config = load_config(&path).unwrap();
    let default = Config::default();
    assert_eq!(config.catalog.root, default.catalog.root);
    assert_eq!(config.encoder.codec, "libx265");
    assert_eq!(config.encoder.preset, "fast");
    assert_eq!(config.retile.min_tile_height, 160);
}

#[test]
fn explicit_path_must_exist() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = load_config_or_default(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn malformed_file_reports_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("panotile.toml");
    fs::write(&path, "[retile\nthreshold = ").unwrap();
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn zero_sizes_are_rejected() {
    let mut config = Config::default();
    config.retile.alignment = 0;
    assert!(validate_config(&config).is_err());

    let mut config = Config::default();
    config.encoder.gop_length = 0;
    assert!(validate_config(&config).is_err());

    let mut config = Config::default();
    config.encoder.codec.clear();
    assert!(validate_config(&config).is_err());
}

#[test]
fn config_roundtrips_through_toml() {
    let mut config = Config::default();
    config.retile.automatic = true;
    config.encoder.codec_params = Some("tiles=2x2".into());

    let text = toml::to_string(&config).unwrap();
    let parsed: Config = toml::from_str(&text).unwrap();
    assert!(parsed.retile.automatic);
    assert_eq!(parsed.encoder.codec_params.as_deref(), Some("tiles=2x2"));
}
