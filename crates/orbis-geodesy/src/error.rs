//! Geodesy error types.

/// Errors raised when constructing geodetic primitives from invalid input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    /// Bounds are inverted, empty, non-finite, or outside the sphere range.
    #[error(
        "invalid tile bounds: lon [{min_lon}, {max_lon}], lat [{min_lat}, {max_lat}] (radians)"
    )]
    InvalidBounds {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },
}
