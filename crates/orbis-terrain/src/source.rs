//! Elevation source contract and the extended sample grid it fills.
//!
//! A request for a tile of `width × height` samples is served as an
//! *extended* grid of `(width + 2) × (height + 2)` samples: one extra ring
//! around the tile, spaced like the tile's own samples. The ring lets mesh
//! normals at the tile border match the neighbouring tile. Rows run from
//! south to north, columns from west to east.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use orbis_geodesy::TileBounds;

use crate::error::SourceError;

/// A request for elevation samples covering one tile.
#[derive(Clone, Debug, PartialEq)]
pub struct ElevationRequest {
    /// Tile bounds in radians.
    pub bounds: TileBounds,
    /// Samples per row inside the tile, at least 2.
    pub width: usize,
    /// Rows inside the tile, at least 2.
    pub height: usize,
    /// Octave cap for sources that composite noise.
    pub max_octaves: u32,
}

impl ElevationRequest {
    /// Square request of `tile_size × tile_size` samples.
    pub fn new(bounds: TileBounds, tile_size: usize, max_octaves: u32) -> Self {
        Self {
            bounds,
            width: tile_size,
            height: tile_size,
            max_octaves,
        }
    }

    /// Reject grids too small to form a single quad.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.width < 2 || self.height < 2 {
            return Err(SourceError::InvalidRequest(format!(
                "grid {}x{} needs at least 2x2 samples",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn extended_width(&self) -> usize {
        self.width + 2
    }

    pub fn extended_height(&self) -> usize {
        self.height + 2
    }

    /// Number of samples a source must return.
    pub fn sample_count(&self) -> usize {
        self.extended_width() * self.extended_height()
    }

    /// Longitude spacing between adjacent samples.
    pub fn lon_step(&self) -> f64 {
        self.bounds.width() / (self.width - 1) as f64
    }

    /// Latitude spacing between adjacent rows.
    pub fn lat_step(&self) -> f64 {
        self.bounds.height() / (self.height - 1) as f64
    }

    /// Unwrapped `(lon, lat)` of extended sample `(x, y)`.
    ///
    /// Ring samples of tiles touching a pole or the antimeridian fall off the
    /// sphere range; pass them through [`wrap_position`] before evaluating.
    pub fn sample_position(&self, x: usize, y: usize) -> (f64, f64) {
        (
            self.bounds.min_lon() + (x as f64 - 1.0) * self.lon_step(),
            self.bounds.min_lat() + (y as f64 - 1.0) * self.lat_step(),
        )
    }

    /// Evaluate `f(lon, lat)` at every extended sample, with positions wrapped
    /// onto the sphere.
    pub fn fill(&self, mut f: impl FnMut(f64, f64) -> f64) -> Vec<f64> {
        let mut samples = Vec::with_capacity(self.sample_count());
        for y in 0..self.extended_height() {
            for x in 0..self.extended_width() {
                let (lon, lat) = self.sample_position(x, y);
                let (lon, lat) = wrap_position(lon, lat);
                samples.push(f(lon, lat));
            }
        }
        samples
    }
}

/// Fold a position that stepped past a pole back over it, then wrap the
/// longitude into `[-π, π)`.
pub fn wrap_position(lon: f64, lat: f64) -> (f64, f64) {
    let (lon, lat) = if lat > FRAC_PI_2 {
        (lon - PI, PI - lat)
    } else if lat < -FRAC_PI_2 {
        (lon - PI, -PI - lat)
    } else {
        (lon, lat)
    };
    if (-PI..=PI).contains(&lon) {
        (lon, lat)
    } else {
        ((lon + PI).rem_euclid(TAU) - PI, lat)
    }
}

/// A source of terrain heights in meters above the ellipsoid.
///
/// Implementations run on scheduler worker threads and must be cheap to
/// share behind an `Arc`.
pub trait ElevationSource: Send + Sync {
    /// Fill the extended grid described by `request`
    /// (`request.sample_count()` values, south row first).
    fn elevation(&self, request: &ElevationRequest) -> Result<Vec<f64>, SourceError>;

    /// Inclusive `(min, max)` of every height the source can produce.
    fn height_range(&self) -> (f64, f64);

    /// Deepest tile level worth refining to with this source's data.
    fn max_level(&self) -> u8 {
        u8::MAX
    }
}
