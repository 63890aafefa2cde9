//! Command-line argument parsing for Orbis.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, ElevationSourceKind};

/// Orbis command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "orbis", about = "Orbis planet LOD core")]
pub struct CliArgs {
    /// Refinement aggressiveness (higher = more tiles).
    #[arg(long)]
    pub detail_multiplier: Option<f64>,

    /// Deepest quad-tree level.
    #[arg(long)]
    pub max_level: Option<u8>,

    /// Tile load worker threads (0 = automatic).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Samples per tile edge.
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Elevation source.
    #[arg(long, value_enum)]
    pub elevation: Option<ElevationSourceKind>,

    /// Vertical exaggeration of the terrain.
    #[arg(long)]
    pub exaggeration: Option<f64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(d) = args.detail_multiplier {
            self.planet.detail_multiplier = d;
        }
        if let Some(level) = args.max_level {
            self.planet.max_level = level;
        }
        if let Some(workers) = args.workers {
            self.scheduler.worker_count = workers;
        }
        if let Some(size) = args.tile_size {
            self.terrain.tile_size = size;
        }
        if let Some(kind) = args.elevation {
            self.terrain.source = kind;
        }
        if let Some(e) = args.exaggeration {
            self.planet.elevation_exaggeration = e;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
