//! Longitude/latitude rectangles used as the spatial key of planet tiles.
//!
//! Point containment is half-open (min-inclusive, max-exclusive) so a point
//! lying on a shared edge belongs to exactly one of the two adjacent tiles.
//! The global maxima (`lon = π`, `lat = π/2`) are the exception: they are
//! inclusive, otherwise the antimeridian and the north pole would belong to
//! no tile at all.
//!
//! Wraparound is never handled here. The planet splits the sphere once into
//! a western and an eastern hemisphere and every descendant stays strictly
//! inside its root.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::GeoError;

/// One quarter of a [`TileBounds`] produced by [`TileBounds::split_into_four`].
///
/// The discriminant is the index into the split array: `[SW, SE, NW, NE]`,
/// i.e. `(west, south)`, `(east, south)`, `(west, north)`, `(east, north)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    SouthWest = 0,
    SouthEast = 1,
    NorthWest = 2,
    NorthEast = 3,
}

impl Quadrant {
    /// All quadrants in split order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::SouthWest,
        Quadrant::SouthEast,
        Quadrant::NorthWest,
        Quadrant::NorthEast,
    ];

    /// Index into the array returned by [`TileBounds::split_into_four`].
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A longitude/latitude rectangle in radians.
///
/// Invariant: `min_lon < max_lon`, `min_lat < max_lat`, and the rectangle
/// lies within `[-π, π] × [-π/2, π/2]`. Enforced by [`TileBounds::new`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl TileBounds {
    /// Create bounds from radians, validating the invariant.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, GeoError> {
        let finite = min_lon.is_finite()
            && min_lat.is_finite()
            && max_lon.is_finite()
            && max_lat.is_finite();
        if !finite
            || min_lon >= max_lon
            || min_lat >= max_lat
            || min_lon < -PI
            || max_lon > PI
            || min_lat < -FRAC_PI_2
            || max_lat > FRAC_PI_2
        {
            return Err(GeoError::InvalidBounds {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Create bounds from degrees.
    pub fn from_degrees(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self, GeoError> {
        Self::new(
            min_lon.to_radians(),
            min_lat.to_radians(),
            max_lon.to_radians(),
            max_lat.to_radians(),
        )
    }

    /// The whole sphere.
    pub const fn world() -> Self {
        Self {
            min_lon: -PI,
            min_lat: -FRAC_PI_2,
            max_lon: PI,
            max_lat: FRAC_PI_2,
        }
    }

    /// Root bounds of the western hemisphere: `[-π, 0] × [-π/2, π/2]`.
    pub const fn western_hemisphere() -> Self {
        Self {
            min_lon: -PI,
            min_lat: -FRAC_PI_2,
            max_lon: 0.0,
            max_lat: FRAC_PI_2,
        }
    }

    /// Root bounds of the eastern hemisphere: `[0, π] × [-π/2, π/2]`.
    pub const fn eastern_hemisphere() -> Self {
        Self {
            min_lon: 0.0,
            min_lat: -FRAC_PI_2,
            max_lon: PI,
            max_lat: FRAC_PI_2,
        }
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Longitude span in radians.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Latitude span in radians.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Center `(lon, lat)` in radians.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) * 0.5,
            (self.min_lat + self.max_lat) * 0.5,
        )
    }

    /// Half-open containment test with the global-maximum exception
    /// described in the module docs.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        let lon_ok = lon >= self.min_lon
            && (lon < self.max_lon || (self.max_lon >= PI && lon <= self.max_lon));
        let lat_ok = lat >= self.min_lat
            && (lat < self.max_lat || (self.max_lat >= FRAC_PI_2 && lat <= self.max_lat));
        lon_ok && lat_ok
    }

    /// Returns true if `other` lies entirely within `self` (edges included).
    pub fn contains_box(&self, other: &TileBounds) -> bool {
        other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
            && other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
    }

    /// Returns true if the two rectangles overlap. Touching edges count as
    /// intersecting, which makes neighbour queries conservative.
    pub fn intersects(&self, other: &TileBounds) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Split at the midpoint of each axis into `[SW, SE, NW, NE]`.
    ///
    /// The children share the parent's exact corner values and the exact
    /// same midpoint, so there is no drift, gap, or overlap between them.
    pub fn split_into_four(&self) -> [TileBounds; 4] {
        let (mid_lon, mid_lat) = self.center();
        let quad = |min_lon, min_lat, max_lon, max_lat| TileBounds {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        [
            quad(self.min_lon, self.min_lat, mid_lon, mid_lat),
            quad(mid_lon, self.min_lat, self.max_lon, mid_lat),
            quad(self.min_lon, mid_lat, mid_lon, self.max_lat),
            quad(mid_lon, mid_lat, self.max_lon, self.max_lat),
        ]
    }

    /// The quadrant a point falls into, using the same tie-break as
    /// [`TileBounds::contains_point`]: the midpoint belongs to the east/north half.
    pub fn quadrant_of(&self, lon: f64, lat: f64) -> Quadrant {
        let (mid_lon, mid_lat) = self.center();
        match (lon >= mid_lon, lat >= mid_lat) {
            (false, false) => Quadrant::SouthWest,
            (true, false) => Quadrant::SouthEast,
            (false, true) => Quadrant::NorthWest,
            (true, true) => Quadrant::NorthEast,
        }
    }

    /// Clamp a point into the closed rectangle.
    pub fn clamp_point(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            lon.clamp(self.min_lon, self.max_lon),
            lat.clamp(self.min_lat, self.max_lat),
        )
    }

    /// Normalized `(u, v)` of a point inside the rectangle, `(0,0)` at the
    /// south-west corner.
    pub fn uv_of(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            (lon - self.min_lon) / self.width(),
            (lat - self.min_lat) / self.height(),
        )
    }

    /// Area of the rectangle on a sphere of the given radius.
    ///
    /// `r² · Δlon · (sin(max_lat) - sin(min_lat))`, additive over splits.
    pub fn spherical_area(&self, radius: f64) -> f64 {
        radius * radius * self.width() * (self.max_lat.sin() - self.min_lat.sin())
    }
}
