//! Construction-time errors for the planet.
//!
//! Fetch-path failures never surface here; they are recovered per tile.

use orbis_config::ConfigError;
use orbis_geodesy::GeoError;
use orbis_terrain::SchedulerError;

/// Misconfiguration detected while building a [`Planet`](crate::Planet).
#[derive(Debug, thiserror::Error)]
pub enum PlanetError {
    /// No camera was supplied to the builder.
    #[error("a planet cannot be built without a camera")]
    MissingCamera,

    /// The camera's projection or placement is unusable.
    #[error("invalid camera: {0}")]
    InvalidCamera(String),

    /// A configuration value is out of range.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// A tile or query bounds is malformed.
    #[error("invalid bounds")]
    Bounds(#[from] GeoError),

    /// The tile load scheduler could not be started.
    #[error("failed to start the tile load scheduler")]
    Scheduler(#[from] SchedulerError),
}
