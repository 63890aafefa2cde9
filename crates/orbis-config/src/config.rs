//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Quad-tree refinement and traversal settings.
    pub planet: PlanetConfig,
    /// Tile load worker pool settings.
    pub scheduler: SchedulerConfig,
    /// Elevation source and tile mesh settings.
    pub terrain: TerrainConfig,
    /// Imagery source settings.
    pub imagery: ImageryConfig,
    /// Camera projection and start position.
    pub camera: CameraConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Quad-tree refinement and traversal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanetConfig {
    /// Higher values lower the split threshold (more aggressive refinement).
    pub detail_multiplier: f64,
    /// Screen-space error in pixels above which a tile splits, before the
    /// detail multiplier is applied.
    pub max_screen_space_error: f64,
    /// Children merge back once the parent error drops below
    /// `threshold * merge_ratio`. Must be in `(0, 1)`.
    pub merge_ratio: f64,
    /// Deepest level the tree may reach (0 = hemisphere roots).
    pub max_level: u8,
    /// Vertical scale applied to elevations when displayed and queried.
    pub elevation_exaggeration: f64,
    /// Wall-clock budget for one traversal slice, in milliseconds.
    pub frame_budget_ms: f64,
    /// Fetch attempts before a tile is considered permanently failed.
    pub fetch_retry_limit: u32,
    /// Frames to wait before the first retry; doubles on every failure.
    pub retry_backoff_frames: u32,
    /// Soft cap on live tiles. Splits are suppressed while the tree is larger.
    pub max_tiles: usize,
}

/// Tile load worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads. `0` picks `min(num_cpus, 4)`.
    pub worker_count: usize,
    /// Maximum jobs queued or executing at once.
    pub max_in_flight: usize,
    /// Bounded queue length of each worker.
    pub queue_capacity: usize,
}

/// Procedural elevation source families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ElevationSourceKind {
    /// Zero everywhere.
    Flat,
    /// Smooth cosine ridges over longitude and latitude.
    Sinusoid,
    /// Multi-octave simplex noise sampled on the unit sphere.
    Noise,
}

/// Elevation source and tile mesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Which procedural source feeds the tiles.
    pub source: ElevationSourceKind,
    /// Samples per tile edge (the fetched grid carries one extra ring).
    pub tile_size: u32,
    /// Lowest elevation the source can produce, in meters.
    pub min_height_m: f64,
    /// Highest elevation the source can produce, in meters.
    pub max_height_m: f64,
    /// Seed for the noise source.
    pub seed: u32,
    /// Octave cap for the noise source.
    pub max_octaves: u32,
    /// Frequency of the first octave on the unit sphere.
    pub base_frequency: f64,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Angular frequency of the sinusoid source.
    pub sinusoid_frequency: f64,
    /// Skirt depth as a fraction of the tile's ground width.
    pub skirt_depth_factor: f64,
}

/// Procedural imagery source families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ImagerySourceKind {
    /// Alternating cells, useful to see tile seams.
    Checker,
    /// Colour ramp by latitude (ocean, land, ice).
    LatitudeBands,
}

/// Imagery source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageryConfig {
    /// Fetch imagery at all. When disabled tiles render with the base colour.
    pub enabled: bool,
    /// Which procedural source produces textures.
    pub source: ImagerySourceKind,
    /// Texture edge length in texels.
    pub tile_imagery_size: u32,
    /// RGBA colour bound to tiles before any texture is available.
    pub base_color: [u8; 4],
}

/// Camera projection and start position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f64,
    /// Near clip distance in meters.
    pub near_m: f64,
    /// Far clip distance in meters.
    pub far_m: f64,
    /// Viewport width in pixels.
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// Start longitude in degrees.
    pub start_lon_degrees: f64,
    /// Start latitude in degrees.
    pub start_lat_degrees: f64,
    /// Start height above the ellipsoid in meters.
    pub start_height_m: f64,
    /// Minimum clearance kept between the camera and the terrain.
    pub min_height_above_ground_m: f64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Frames between tree statistics log lines. `0` disables them.
    pub stats_interval_frames: u32,
}

// --- Default implementations ---

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            detail_multiplier: 1.0,
            max_screen_space_error: 32.0,
            merge_ratio: 0.5,
            max_level: 22,
            elevation_exaggeration: 1.0,
            frame_budget_ms: 0.5,
            fetch_retry_limit: 3,
            retry_backoff_frames: 2,
            max_tiles: 16_384,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            max_in_flight: 128,
            queue_capacity: 64,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            source: ElevationSourceKind::Noise,
            tile_size: 32,
            min_height_m: -10_000.0,
            max_height_m: 10_000.0,
            seed: 0,
            max_octaves: 13,
            base_frequency: 1.5,
            lacunarity: 2.0,
            persistence: 0.5,
            sinusoid_frequency: 500.0,
            skirt_depth_factor: 0.02,
        }
    }
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: ImagerySourceKind::LatitudeBands,
            tile_imagery_size: 256,
            base_color: [40, 64, 96, 255],
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            near_m: 1.0,
            far_m: 1.0e9,
            viewport_width: 1920,
            viewport_height: 1080,
            start_lon_degrees: 0.0,
            start_lat_degrees: 0.0,
            start_height_m: 40_000_000.0,
            min_height_above_ground_m: 10.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stats_interval_frames: 60,
        }
    }
}

// --- Validation ---

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a positive number, got {value}")))
    }
}

/// Longest traversal slice a single update may take.
pub const MAX_FRAME_BUDGET_MS: f64 = 1000.0;

impl PlanetConfig {
    /// Check ranges. Called by the planet builder before any tile exists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("planet.detail_multiplier", self.detail_multiplier)?;
        positive("planet.max_screen_space_error", self.max_screen_space_error)?;
        positive("planet.frame_budget_ms", self.frame_budget_ms)?;
        if self.frame_budget_ms > MAX_FRAME_BUDGET_MS {
            return Err(invalid(
                "planet.frame_budget_ms",
                format!(
                    "must be at most {MAX_FRAME_BUDGET_MS} ms, got {}",
                    self.frame_budget_ms
                ),
            ));
        }
        if !(self.merge_ratio > 0.0 && self.merge_ratio < 1.0) {
            return Err(invalid(
                "planet.merge_ratio",
                format!("must be in (0, 1), got {}", self.merge_ratio),
            ));
        }
        if self.max_level > 30 {
            return Err(invalid(
                "planet.max_level",
                format!("must be at most 30, got {}", self.max_level),
            ));
        }
        if !self.elevation_exaggeration.is_finite() || self.elevation_exaggeration < 0.0 {
            return Err(invalid(
                "planet.elevation_exaggeration",
                format!("must be finite and >= 0, got {}", self.elevation_exaggeration),
            ));
        }
        if self.fetch_retry_limit == 0 {
            return Err(invalid("planet.fetch_retry_limit", "must be at least 1"));
        }
        if self.max_tiles < 2 {
            return Err(invalid("planet.max_tiles", "must hold at least the two roots"));
        }
        Ok(())
    }
}

impl SchedulerConfig {
    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(invalid("scheduler.max_in_flight", "must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("scheduler.queue_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

impl TerrainConfig {
    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=256).contains(&self.tile_size) {
            return Err(invalid(
                "terrain.tile_size",
                format!("must be in 2..=256, got {}", self.tile_size),
            ));
        }
        let finite = self.min_height_m.is_finite() && self.max_height_m.is_finite();
        if !finite || self.min_height_m >= self.max_height_m {
            return Err(invalid(
                "terrain.min_height_m",
                format!(
                    "height range [{}, {}] is empty or not finite",
                    self.min_height_m, self.max_height_m
                ),
            ));
        }
        if self.max_octaves == 0 {
            return Err(invalid("terrain.max_octaves", "must be at least 1"));
        }
        positive("terrain.base_frequency", self.base_frequency)?;
        positive("terrain.lacunarity", self.lacunarity)?;
        positive("terrain.persistence", self.persistence)?;
        positive("terrain.sinusoid_frequency", self.sinusoid_frequency)?;
        if !self.skirt_depth_factor.is_finite() || self.skirt_depth_factor < 0.0 {
            return Err(invalid("terrain.skirt_depth_factor", "must be finite and >= 0"));
        }
        Ok(())
    }
}

impl ImageryConfig {
    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_imagery_size == 0 || self.tile_imagery_size > 4096 {
            return Err(invalid(
                "imagery.tile_imagery_size",
                format!("must be in 1..=4096, got {}", self.tile_imagery_size),
            ));
        }
        Ok(())
    }
}

impl CameraConfig {
    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(invalid(
                "camera.fov_y_degrees",
                format!("must be in (0, 180), got {}", self.fov_y_degrees),
            ));
        }
        positive("camera.near_m", self.near_m)?;
        if !(self.far_m.is_finite() && self.far_m > self.near_m) {
            return Err(invalid("camera.far_m", "must be finite and beyond near_m"));
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(invalid("camera.viewport_height", "viewport must not be empty"));
        }
        if !self.min_height_above_ground_m.is_finite() || self.min_height_above_ground_m < 0.0 {
            return Err(invalid(
                "camera.min_height_above_ground_m",
                "must be finite and >= 0",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Validate every section, reporting the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.planet.validate()?;
        self.scheduler.validate()?;
        self.terrain.validate()?;
        self.imagery.validate()?;
        self.camera.validate()?;
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for Orbis, e.g. `~/.config/orbis` on Linux.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("orbis"))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
