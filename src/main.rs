mod cli;

use panotile::catalog::Catalog;
use panotile::config::{self, Config};
use panotile::encode::FfmpegTileEncoder;
use panotile::operators::Operator;
use panotile::semantic::{InMemorySemanticIndex, SemanticIndex};
use panotile::{tools, VideoManager};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, QueryArgs};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "panotile=debug,panotile_media=debug,panotile_bitstream=debug".to_string()
        } else {
            "panotile=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckTools => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: ref config_path,
        } => {
            let path = config_path.clone().or_else(|| cli.config.clone());
            validate_config(path.as_deref())
        }
        ref command => {
            let manager = open_manager(&cli)?;
            run(&manager, command)
        }
    }
}

fn open_manager(cli: &Cli) -> Result<VideoManager> {
    let mut config = config::load_config_or_default(cli.config.as_deref())?;
    if let Some(root) = &cli.catalog {
        config.catalog.root = root.clone();
    }
    if let Some(index) = &cli.index {
        config.semantic_index.path = Some(index.clone());
    }

    let catalog = Catalog::open(&config.catalog.root)
        .with_context(|| format!("Failed to open catalog at {:?}", config.catalog.root))?;
    let index = load_index(&config)?;
    let encoder = Arc::new(FfmpegTileEncoder::new(config.encoder.clone()));
    Ok(VideoManager::new(catalog, encoder, index, &config))
}

fn load_index(config: &Config) -> Result<Arc<dyn SemanticIndex>> {
    match &config.semantic_index.path {
        Some(path) if path.exists() => {
            let index = InMemorySemanticIndex::load_json(path)
                .with_context(|| format!("Failed to load detections from {:?}", path))?;
            Ok(Arc::new(index))
        }
        Some(path) => {
            tracing::warn!("Detections file {:?} not found, using an empty index", path);
            Ok(Arc::new(InMemorySemanticIndex::new()))
        }
        None => Ok(Arc::new(InMemorySemanticIndex::new())),
    }
}

fn run(manager: &VideoManager, command: &Commands) -> Result<()> {
    match command {
        Commands::Store {
            name,
            source,
            rows,
            columns,
        } => {
            let version = manager.store(name, source, *rows, *columns)?;
            println!("Stored '{}' as version {} ({}x{} tiles)", name, version, rows, columns);
        }
        Commands::StoreFitted {
            name,
            source,
            label,
            metadata,
        } => {
            let version = manager.store_fitted(name, source, metadata.as_deref(), label)?;
            print_summary(manager, name, version)?;
        }
        Commands::Retile {
            name,
            label,
            metadata,
        } => {
            let version = manager
                .retile_for_label(name, metadata.as_deref(), label)?
                .context("A retile of this video is already running")?;
            print_summary(manager, name, version)?;
        }
        Commands::Select {
            name,
            query,
            strategy,
            output,
        } => select(manager, name, query, (*strategy).into(), output)?,
        Commands::Tiles { name, query } => {
            let mut operator = manager.tiles(
                name,
                query.metadata.as_deref(),
                query.selection(),
                query.temporal(),
            )?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            while let Some(info) = operator.next()? {
                writeln!(out, "{}", serde_json::to_string(&info)?)?;
            }
        }
        Commands::Info { name, json } => info(manager, name, *json)?,
        Commands::ValidateLayout { name } => validate_layout(manager, name)?,
        // Handled in main before the catalog is opened.
        Commands::CheckTools | Commands::Validate { .. } => {}
    }
    Ok(())
}

fn select(
    manager: &VideoManager,
    name: &str,
    query: &QueryArgs,
    strategy: panotile_common::SelectStrategy,
    output: &Path,
) -> Result<()> {
    let results = manager.select(
        name,
        query.metadata.as_deref(),
        query.selection(),
        query.temporal(),
        strategy,
    )?;

    let mut file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create output file: {:?}", output))?;
    let mut bytes = 0;
    for frames in &results {
        file.write_all(&frames.data)?;
        bytes += frames.data.len();
    }

    println!(
        "Selected {} {} from '{}' ({} bytes) -> {}",
        results.len(),
        strategy,
        name,
        bytes,
        output.display()
    );
    for frames in &results {
        match frames.tile {
            Some(tile) => println!(
                "  tile {} {} frames {}..={}",
                tile,
                frames.rectangle,
                frames.frames.first().copied().unwrap_or_default(),
                frames.frames.last().copied().unwrap_or_default()
            ),
            None => println!("  {} frames", frames.frames.len()),
        }
    }
    Ok(())
}

fn print_summary(manager: &VideoManager, name: &str, version: panotile_common::LayoutVersion) -> Result<()> {
    let manifest = manager.manifest(name)?;
    println!(
        "Stored '{}' as version {} ({} spans, {} tile streams)",
        name,
        version,
        manifest.spans.len(),
        manifest.stream_count()
    );
    Ok(())
}

fn info(manager: &VideoManager, name: &str, json: bool) -> Result<()> {
    let manifest = manager.manifest(name)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!("Entry: {}", name);
    println!("Version: {}", manifest.version);
    println!(
        "Geometry: {}x{}, {} frames",
        manifest.width, manifest.height, manifest.frame_count
    );
    println!("GOP length: {}", manifest.gop_length);
    if let Some(ref source) = manifest.source {
        println!("Source: {}", source.display());
    }
    println!("Created: {}", manifest.created_at.to_rfc3339());
    println!("\nSpans: {}", manifest.spans.len());
    for span in &manifest.spans {
        let layout = &span.layout;
        print!(
            "  [{}..{}) {}x{} tiles",
            span.first_frame,
            span.last_frame,
            layout.rows(),
            layout.columns()
        );
        if !layout.is_uniform() {
            print!(" [non-uniform]");
        }
        println!();
        println!("      columns: {:?}", layout.column_widths());
        println!("      rows: {:?}", layout.row_heights());
    }
    Ok(())
}

fn validate_layout(manager: &VideoManager, name: &str) -> Result<()> {
    let provider = manager.provider(name)?;
    let manifest = provider.manifest();
    manifest.validate()?;

    let mut missing = Vec::new();
    for span in &manifest.spans {
        for tile in 0..span.layout.tile_count() {
            let path = provider.location_of_tile_for_frame(tile, span.first_frame)?;
            if !path.exists() {
                missing.push(path);
            }
        }
    }

    if missing.is_empty() {
        println!(
            "✓ Layout version {} of '{}' is valid ({} tile streams)",
            manifest.version,
            name,
            manifest.stream_count()
        );
        Ok(())
    } else {
        for path in &missing {
            println!("✗ Missing tile stream: {}", path.display());
        }
        anyhow::bail!("{} tile streams are missing", missing.len())
    }
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let statuses = tools::check_encoder_tools(&config.encoder);
    let mut all_ok = true;

    for tool in &statuses {
        let mark = if tool.is_available() { "✓" } else { "✗" };
        all_ok &= tool.is_available();

        print!("{} {}", mark, tool.name);
        if let Some(version) = &tool.version {
            print!(" ({})", version);
        }
        if let Some(path) = &tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    if let Some(ffmpeg) = statuses.iter().find(|t| t.name == "ffmpeg" && t.is_available()) {
        let codec = &config.encoder.codec;
        let path = ffmpeg.path.as_deref().unwrap_or_else(|| Path::new("ffmpeg"));
        if tools::supports_codec(path, codec) {
            println!("✓ encoder {}", codec);
        } else {
            all_ok = false;
            println!("✗ encoder {} (not built into this ffmpeg)", codec);
        }
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to store and retile videos.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };
    println!("  Catalog: {}", config.catalog.root.display());
    println!(
        "  Encoder: {} (preset {}, GOP {})",
        config.encoder.codec, config.encoder.preset, config.encoder.gop_length
    );
    println!(
        "  Retile: threshold {}, automatic {}",
        config.retile.threshold, config.retile.automatic
    );
    Ok(())
}
