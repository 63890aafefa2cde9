//! WGS84 geodesy and longitude/latitude tile bounds for the Orbis planet core.

mod bounds;
mod ellipsoid;
mod error;
mod frame;

pub use bounds::{Quadrant, TileBounds};
pub use ellipsoid::{
    Geodetic, WGS84_A, WGS84_B, WGS84_E2, WGS84_EP2, forward, forward_degrees, inverse,
    inverse_degrees, surface_normal,
};
pub use error::GeoError;
pub use frame::{east_north_up, haversine_distance};
