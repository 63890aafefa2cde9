//! Local tangent frames and great-circle distances.

use glam::{DMat3, DVec3};

use crate::ellipsoid::WGS84_A;

/// East-North-Up basis at a geodetic position, as columns `(east, north, up)`.
///
/// Multiplying a local ENU vector by this matrix yields an earth-centred
/// direction. The transpose maps the other way.
pub fn east_north_up(lon: f64, lat: f64) -> DMat3 {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let east = DVec3::new(-sin_lon, cos_lon, 0.0);
    let north = DVec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let up = DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
    DMat3::from_cols(east, north, up)
}

/// Great-circle distance in meters between two `(lon, lat)` points in
/// radians, on a sphere with the WGS84 semi-major axis as radius.
pub fn haversine_distance(lon_a: f64, lat_a: f64, lon_b: f64, lat_b: f64) -> f64 {
    let d_lat = lat_b - lat_a;
    let d_lon = lon_b - lon_a;
    let h = (d_lat * 0.5).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon * 0.5).sin().powi(2);
    2.0 * WGS84_A * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_enu_is_orthonormal() {
        let m = east_north_up(0.8, -0.4);
        let (e, n, u) = (m.x_axis, m.y_axis, m.z_axis);
        assert!((e.length() - 1.0).abs() < 1e-12);
        assert!((n.length() - 1.0).abs() < 1e-12);
        assert!((u.length() - 1.0).abs() < 1e-12);
        assert!(e.dot(n).abs() < 1e-12);
        assert!(e.dot(u).abs() < 1e-12);
        assert!((e.cross(n) - u).length() < 1e-12, "frame must be right-handed");
    }

    #[test]
    fn test_enu_at_origin() {
        let m = east_north_up(0.0, 0.0);
        assert!((m.x_axis - DVec3::Y).length() < 1e-12);
        assert!((m.y_axis - DVec3::Z).length() < 1e-12);
        assert!((m.z_axis - DVec3::X).length() < 1e-12);
    }

    #[test]
    fn test_haversine_quarter_circumference() {
        let d = haversine_distance(0.0, 0.0, FRAC_PI_2, 0.0);
        let expected = WGS84_A * FRAC_PI_2;
        assert!((d - expected).abs() < 1e-6, "got {d}, expected {expected}");
    }

    #[test]
    fn test_haversine_antipodal_and_zero() {
        assert!(haversine_distance(0.3, 0.2, 0.3, 0.2).abs() < 1e-9);
        let d = haversine_distance(0.0, 0.0, PI, 0.0);
        assert!((d - WGS84_A * PI).abs() < 1e-3);
    }
}
