//! Horizon culling against an occluding sphere inside the planet.
//!
//! The occluder is the polar-radius sphere lowered by the deepest elevation
//! the source can produce, so it never pokes through real terrain. A tile is
//! hidden when its whole bounding sphere lies behind the occluder's horizon
//! as seen from the camera.

use glam::DVec3;
use orbis_geodesy::WGS84_B;

use crate::frustum::BoundingSphere;

/// Horizon culling state computed from camera position and occluder size.
#[derive(Clone, Debug)]
pub struct HorizonCuller {
    /// Camera position, planet-centred.
    camera_pos: DVec3,
    /// Occluder radius in meters.
    radius: f64,
    /// Distance from camera to the planet centre.
    camera_distance: f64,
    /// Angle, seen from the centre, between the camera and its horizon.
    horizon_angle: f64,
}

impl HorizonCuller {
    pub fn new(camera_pos: DVec3, radius: f64) -> Self {
        let camera_distance = camera_pos.length();
        let horizon_angle = if camera_distance > radius {
            (radius / camera_distance).acos()
        } else {
            // inside the occluder, nothing is culled
            std::f64::consts::PI
        };
        Self {
            camera_pos,
            radius,
            camera_distance,
            horizon_angle,
        }
    }

    /// Occluder for terrain whose lowest display elevation is `min_height`.
    pub fn for_terrain(camera_pos: DVec3, min_height: f64) -> Self {
        Self::new(camera_pos, (WGS84_B + min_height.min(0.0)).max(1.0))
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// `true` if any part of the sphere may be above the horizon.
    ///
    /// A point at distance `ρ > r` from the centre stays visible up to
    /// `acos(r/d) + acos(r/ρ)` away from the sub-camera direction; the
    /// sphere's own angular radius is added on top.
    pub fn is_above_horizon(&self, sphere: &BoundingSphere) -> bool {
        if self.camera_distance <= self.radius {
            return true;
        }
        let dist = sphere.center.length();
        if dist <= sphere.radius || dist < 1e-10 {
            // sphere contains the planet centre
            return true;
        }

        let cos_angle = sphere.center.dot(self.camera_pos) / (dist * self.camera_distance);
        let angle = cos_angle.clamp(-1.0, 1.0).acos();

        let margin = (sphere.radius / dist).min(1.0).asin();
        let elevation = if dist > self.radius {
            (self.radius / dist).acos()
        } else {
            0.0
        };

        angle <= self.horizon_angle + margin + elevation
    }

    /// Straight-line distance from the camera to the occluder's horizon.
    pub fn horizon_distance(&self) -> f64 {
        if self.camera_distance <= self.radius {
            return 0.0;
        }
        (self.camera_distance * self.camera_distance - self.radius * self.radius).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RADIUS: f64 = 6_400_000.0;

    fn earth_culler(altitude: f64) -> HorizonCuller {
        HorizonCuller::new(DVec3::new(0.0, RADIUS + altitude, 0.0), RADIUS)
    }

    fn sphere(center: DVec3, radius: f64) -> BoundingSphere {
        BoundingSphere { center, radius }
    }

    #[test]
    fn test_tile_directly_below_is_visible() {
        let culler = earth_culler(1000.0);
        assert!(culler.is_above_horizon(&sphere(DVec3::new(0.0, RADIUS, 0.0), 100.0)));
    }

    #[test]
    fn test_tile_on_far_side_is_culled() {
        let culler = earth_culler(1000.0);
        assert!(
            !culler.is_above_horizon(&sphere(DVec3::new(0.0, -RADIUS, 0.0), 100.0)),
            "tile on far side of planet should be culled"
        );
    }

    #[test]
    fn test_horizon_distance_increases_with_altitude() {
        let low = earth_culler(100.0);
        let high = earth_culler(10_000.0);
        assert!(high.horizon_distance() > low.horizon_distance());
    }

    #[test]
    fn test_camera_in_space_sees_hemisphere() {
        let culler = earth_culler(RADIUS * 100.0);
        let mid = DVec3::new(RADIUS * 0.707, RADIUS * 0.707, 0.0);
        assert!(culler.is_above_horizon(&sphere(mid, 100.0)));
        assert!(!culler.is_above_horizon(&sphere(DVec3::new(0.0, -RADIUS, 0.0), 100.0)));
    }

    #[test]
    fn test_horizon_edge_tile_is_visible() {
        let culler = earth_culler(1000.0);
        let d = RADIUS + 1000.0;
        let tangent_height = RADIUS * RADIUS / d;
        let tangent_perp = (RADIUS * RADIUS - tangent_height * tangent_height).max(0.0).sqrt();
        let tangent_point = DVec3::new(0.0, tangent_height, tangent_perp);
        assert!(culler.is_above_horizon(&sphere(tangent_point, 500.0)));
    }

    #[test]
    fn test_mountain_beyond_horizon_stays_visible() {
        let culler = earth_culler(1000.0);
        // 20 km peak ~400 km away: the ground there is hidden, the summit is not.
        let angle: f64 = 400_000.0 / RADIUS;
        let dir = DVec3::new(0.0, angle.cos(), angle.sin());
        assert!(!culler.is_above_horizon(&sphere(dir * RADIUS, 10.0)));
        assert!(culler.is_above_horizon(&sphere(dir * (RADIUS + 20_000.0), 10.0)));
    }

    #[test]
    fn test_sphere_around_centre_always_visible() {
        let culler = earth_culler(1000.0);
        assert!(culler.is_above_horizon(&sphere(DVec3::new(0.0, -10.0, 0.0), RADIUS)));
        let inside = HorizonCuller::new(DVec3::new(0.0, 10.0, 0.0), RADIUS);
        assert!(inside.is_above_horizon(&sphere(DVec3::new(0.0, -RADIUS, 0.0), 1.0)));
    }

    #[test]
    fn test_terrain_occluder_shrinks_with_depth() {
        let shallow = HorizonCuller::for_terrain(DVec3::X * 1e7, 0.0);
        let deep = HorizonCuller::for_terrain(DVec3::X * 1e7, -10_000.0);
        assert!((shallow.radius() - WGS84_B).abs() < 1e-9);
        assert!((deep.radius() - (WGS84_B - 10_000.0)).abs() < 1e-9);
        // positive minimum never raises the occluder
        assert_eq!(HorizonCuller::for_terrain(DVec3::X * 1e7, 500.0).radius(), WGS84_B);
    }
}
