//! Configuration system for Orbis.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, range validation, hot-reload detection, and
//! forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CameraConfig, Config, DebugConfig, ElevationSourceKind, ImageryConfig, ImagerySourceKind,
    MAX_FRAME_BUDGET_MS, PlanetConfig, SchedulerConfig, TerrainConfig,
};
pub use error::ConfigError;
