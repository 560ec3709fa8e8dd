use clap::{Args, Parser, Subcommand, ValueEnum};
use panotile::semantic::{MetadataSelection, TemporalSelection};
use panotile_common::SelectStrategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "panotile")]
#[command(author, version, about = "Tiled storage and object-level selection for panoramic video")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog directory (overrides the config file)
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Detections JSON file (overrides the config file)
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a video under a uniform tile grid
    Store {
        /// Catalog entry name
        name: String,

        /// Source video
        source: PathBuf,

        #[arg(long, default_value = "1")]
        rows: u32,

        #[arg(long, default_value = "1")]
        columns: u32,
    },

    /// Store a video with tiles fitted to the boxes of a label
    StoreFitted {
        name: String,

        source: PathBuf,

        /// Label whose boxes drive the layout
        #[arg(short, long)]
        label: String,

        /// Video identifier in the semantic index (defaults to the name)
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Select objects, tiles, or stitched frames and write them to a file
    Select {
        name: String,

        #[command(flatten)]
        query: QueryArgs,

        #[arg(long, value_enum, default_value_t = StrategyArg::Objects)]
        strategy: StrategyArg,

        /// Annex B output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the tiles a query touches as JSON lines
    Tiles {
        name: String,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Retile a stored video on the regret of a whole-video query for a label
    Retile {
        name: String,

        #[arg(short, long)]
        label: String,

        #[arg(long)]
        metadata: Option<String>,
    },

    /// Show the current layout of a stored video
    Info {
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the stored layout is complete and consistent
    ValidateLayout { name: String },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct QueryArgs {
    /// Labels to select (repeatable)
    #[arg(short, long = "label", required = true)]
    pub labels: Vec<String>,

    /// Require every label in a frame instead of any
    #[arg(long)]
    pub all: bool,

    /// First frame (inclusive)
    #[arg(long, conflicts_with = "frame")]
    pub first: Option<u32>,

    /// Last frame (exclusive)
    #[arg(long, requires = "first")]
    pub last: Option<u32>,

    /// Single frame
    #[arg(long)]
    pub frame: Option<u32>,

    #[arg(long)]
    pub metadata: Option<String>,
}

impl QueryArgs {
    pub fn selection(&self) -> MetadataSelection {
        match (self.labels.as_slice(), self.all) {
            ([label], _) => MetadataSelection::Single(label.clone()),
            (labels, true) => MetadataSelection::All(labels.to_vec()),
            (labels, false) => MetadataSelection::Any(labels.to_vec()),
        }
    }

    pub fn temporal(&self) -> TemporalSelection {
        match (self.frame, self.first, self.last) {
            (Some(frame), _, _) => TemporalSelection::Frame(frame),
            (None, Some(first), Some(last)) => TemporalSelection::Range { first, last },
            (None, Some(first), None) => TemporalSelection::Range {
                first,
                last: u32::MAX,
            },
            _ => TemporalSelection::None,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Objects,
    Tiles,
    Frames,
}

impl From<StrategyArg> for SelectStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Objects => SelectStrategy::Objects,
            StrategyArg::Tiles => SelectStrategy::Tiles,
            StrategyArg::Frames => SelectStrategy::Frames,
        }
    }
}
