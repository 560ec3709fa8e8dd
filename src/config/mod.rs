mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./panotile.toml", "~/.config/panotile/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if !(config.retile.threshold.is_finite() && config.retile.threshold > 0.0) {
        anyhow::bail!(
            "Retile threshold must be a positive number, got {}",
            config.retile.threshold
        );
    }

    if config.retile.min_tile_width == 0 || config.retile.min_tile_height == 0 {
        anyhow::bail!("Minimum tile size cannot be 0");
    }

    if config.retile.alignment == 0 {
        anyhow::bail!("Tile alignment cannot be 0");
    }

    if config.encoder.gop_length == 0 {
        anyhow::bail!("Encoder GOP length cannot be 0");
    }

    if config.encoder.codec.is_empty() {
        anyhow::bail!("Encoder codec cannot be empty");
    }

    if let Some(path) = &config.semantic_index.path {
        if !path.exists() {
            tracing::warn!("Semantic index file does not exist: {:?}", path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        validate_config(&config).unwrap();
        assert_eq!(config.encoder.gop_length, 30);
        assert_eq!(config.retile.threshold, 1.0);
        assert!(config.scan.read_entire_gops);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [catalog]
            root = "/srv/panotile"

            [retile]
            automatic = true
            threshold = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.catalog.root, Path::new("/srv/panotile"));
        assert!(config.retile.automatic);
        assert_eq!(config.retile.threshold, 2.5);
        assert_eq!(config.retile.min_tile_width, 256);
        assert_eq!(config.encoder.codec, "libx265");
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = Config::default();
        config.retile.threshold = 0.0;
        assert!(validate_config(&config).is_err());
        config.retile.threshold = f64::NAN;
        assert!(validate_config(&config).is_err());
    }
}
