//! Perspective camera in earth-centred, earth-fixed coordinates.
//!
//! Everything is `f64`: at planetary scale `f32` cannot place a camera a few
//! meters above the ground. The projection uses reverse-Z like the rest of
//! the renderer, so the frustum extraction in [`crate::frustum`] expects
//! near at depth 1 and far at depth 0.

use glam::{DMat3, DMat4, DQuat, DVec3};
use orbis_config::CameraConfig;
use orbis_geodesy::{Geodetic, east_north_up, inverse};

use crate::error::PlanetError;

/// Camera state consumed by [`Planet::update`](crate::Planet::update).
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// ECEF position in meters.
    pub position: DVec3,
    /// Rotation as a unit quaternion; the camera looks down its local -Z.
    pub rotation: DQuat,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Width / height.
    pub aspect_ratio: f64,
    /// Near clip plane distance (always positive).
    pub near: f64,
    /// Far clip plane distance (always positive, > near).
    pub far: f64,
    /// Viewport height in pixels, used to convert errors to pixels.
    pub viewport_height: u32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            fov_y: std::f64::consts::FRAC_PI_3,
            aspect_ratio: 16.0 / 9.0,
            near: 1.0,
            far: 1.0e9,
            viewport_height: 1080,
        }
    }
}

impl Camera {
    /// Camera with the configured projection, placed at the configured start
    /// position and looking straight down.
    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self {
            fov_y: config.fov_y_degrees.to_radians(),
            aspect_ratio: config.viewport_width as f64 / config.viewport_height.max(1) as f64,
            near: config.near_m,
            far: config.far_m,
            viewport_height: config.viewport_height,
            ..Self::default()
        };
        camera.place(
            Geodetic::from_degrees(
                config.start_lon_degrees,
                config.start_lat_degrees,
                config.start_height_m,
            ),
            0.0,
            -std::f64::consts::FRAC_PI_2,
        );
        camera
    }

    /// Move the camera to `geo`, facing `heading` (radians clockwise from
    /// north) tilted by `pitch` (radians, negative looks down).
    pub fn place(&mut self, geo: Geodetic, heading: f64, pitch: f64) {
        let enu = east_north_up(geo.lon, geo.lat);
        let (east, north, up) = (enu.x_axis, enu.y_axis, enu.z_axis);

        let (sin_h, cos_h) = heading.sin_cos();
        let (sin_p, cos_p) = pitch.sin_cos();
        let ahead = north * cos_h + east * sin_h;

        let forward = ahead * cos_p + up * sin_p;
        let cam_up = ahead * -sin_p + up * cos_p;

        self.position = geo.to_cartesian();
        self.rotation = rotation_from_axes(forward, cam_up);
    }

    /// Turn the camera towards `target`, keeping `world_up` as close to the
    /// screen's up as possible.
    pub fn look_at(&mut self, target: DVec3, world_up: DVec3) {
        let Some(forward) = (target - self.position).try_normalize() else {
            return;
        };
        let up = if forward.cross(world_up).length_squared() < 1e-12 {
            forward.any_orthonormal_vector()
        } else {
            world_up
        };
        self.rotation = rotation_from_axes(forward, up);
    }

    /// Compute the view matrix (inverse of camera transform).
    pub fn view_matrix(&self) -> DMat4 {
        let rotation_matrix = DMat4::from_quat(self.rotation);
        let translation_matrix = DMat4::from_translation(self.position);
        (translation_matrix * rotation_matrix).inverse()
    }

    /// Reverse-Z perspective: near maps to depth 1, far to depth 0.
    pub fn projection_matrix(&self) -> DMat4 {
        DMat4::perspective_rh(self.fov_y, self.aspect_ratio, self.far, self.near)
    }

    pub fn view_projection_matrix(&self) -> DMat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> DVec3 {
        self.rotation * DVec3::NEG_Z
    }

    pub fn up(&self) -> DVec3 {
        self.rotation * DVec3::Y
    }

    pub fn right(&self) -> DVec3 {
        self.rotation * DVec3::X
    }

    /// Geodetic position of the camera.
    pub fn geodetic(&self) -> Geodetic {
        inverse(self.position)
    }

    /// Pixels per meter of error at unit distance:
    /// `viewport_height / (2 * tan(fov_y / 2))`.
    pub fn sse_factor(&self) -> f64 {
        self.viewport_height as f64 / (2.0 * (self.fov_y * 0.5).tan())
    }

    /// Update the aspect ratio and viewport height after a resize.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect_ratio = width as f64 / height.max(1) as f64;
        self.viewport_height = height;
    }

    /// Reject projections that would produce meaningless errors or planes.
    pub fn validate(&self) -> Result<(), PlanetError> {
        let invalid = |msg: String| Err(PlanetError::InvalidCamera(msg));
        if !(self.fov_y > 0.0 && self.fov_y < std::f64::consts::PI) {
            return invalid(format!("fov_y {} must be in (0, π)", self.fov_y));
        }
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return invalid(format!("aspect ratio {} must be positive", self.aspect_ratio));
        }
        if !(self.near > 0.0 && self.far > self.near && self.far.is_finite()) {
            return invalid(format!(
                "clip range {}..{} must satisfy 0 < near < far",
                self.near, self.far
            ));
        }
        if self.viewport_height == 0 {
            return invalid("viewport height must be non-zero".to_string());
        }
        if !self.position.is_finite() {
            return invalid(format!("position {} is not finite", self.position));
        }
        if !(self.rotation.is_finite() && self.rotation.is_normalized()) {
            return invalid("rotation must be a unit quaternion".to_string());
        }
        Ok(())
    }
}

/// Rotation whose local -Z is `forward` and local +Y lies in the plane of
/// `forward` and `up`.
fn rotation_from_axes(forward: DVec3, up: DVec3) -> DQuat {
    let forward = forward.normalize();
    let right = forward.cross(up).normalize();
    let cam_up = right.cross(forward);
    DQuat::from_mat3(&DMat3::from_cols(right, cam_up, -forward)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_geodesy::{WGS84_A, surface_normal};

    #[test]
    fn test_identity_camera_looks_down_neg_z() {
        let camera = Camera::default();
        let forward = camera.forward();
        assert!((forward - DVec3::NEG_Z).length() < 1e-12);
    }

    #[test]
    fn test_place_looking_down() {
        let mut camera = Camera::default();
        let geo = Geodetic::from_degrees(30.0, 45.0, 1000.0);
        camera.place(geo, 0.0, -std::f64::consts::FRAC_PI_2);

        let down = -surface_normal(geo.lon, geo.lat);
        assert!((camera.forward() - down).length() < 1e-9);

        // north is up on screen, east to the right
        let enu = east_north_up(geo.lon, geo.lat);
        assert!((camera.up() - enu.y_axis).length() < 1e-9);
        assert!((camera.right() - enu.x_axis).length() < 1e-9);

        let back = camera.geodetic();
        assert!((back.height - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_place_level_heading_east() {
        let mut camera = Camera::default();
        let geo = Geodetic::from_degrees(0.0, 0.0, 10.0);
        camera.place(geo, std::f64::consts::FRAC_PI_2, 0.0);
        // At (0, 0) east is +Y and up is +X.
        assert!((camera.forward() - DVec3::Y).length() < 1e-9);
        assert!((camera.up() - DVec3::X).length() < 1e-9);
    }

    #[test]
    fn test_view_matrix_inverse_is_camera_transform() {
        let mut camera = Camera::default();
        camera.place(Geodetic::from_degrees(-70.0, 10.0, 5_000.0), 1.0, -0.3);
        let inv_view = camera.view_matrix().inverse();
        let reconstructed = inv_view.col(3).truncate();
        assert!((reconstructed - camera.position).length() < 1e-6);
    }

    #[test]
    fn test_reverse_z_depth() {
        let camera = Camera {
            near: 1.0,
            far: 1000.0,
            ..Camera::default()
        };
        let vp = camera.view_projection_matrix();
        let near = vp.project_point3(DVec3::new(0.0, 0.0, -1.0));
        let far = vp.project_point3(DVec3::new(0.0, 0.0, -1000.0));
        assert!((near.z - 1.0).abs() < 1e-9);
        assert!(far.z.abs() < 1e-9);
    }

    #[test]
    fn test_look_at_points_forward() {
        let mut camera = Camera {
            position: DVec3::new(WGS84_A * 3.0, 0.0, 0.0),
            ..Camera::default()
        };
        camera.look_at(DVec3::ZERO, DVec3::Z);
        assert!((camera.forward() - DVec3::NEG_X).length() < 1e-9);
        assert!((camera.up() - DVec3::Z).length() < 1e-9);

        // Degenerate up still yields a valid rotation.
        camera.look_at(DVec3::ZERO, DVec3::X);
        assert!(camera.validate().is_ok());
        assert!((camera.forward() - DVec3::NEG_X).length() < 1e-9);
    }

    #[test]
    fn test_sse_factor() {
        let camera = Camera {
            fov_y: std::f64::consts::FRAC_PI_2,
            viewport_height: 1000,
            ..Camera::default()
        };
        assert!((camera.sse_factor() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_bad_projection() {
        let bad = [
            Camera {
                fov_y: 0.0,
                ..Camera::default()
            },
            Camera {
                near: 10.0,
                far: 5.0,
                ..Camera::default()
            },
            Camera {
                viewport_height: 0,
                ..Camera::default()
            },
            Camera {
                position: DVec3::new(f64::NAN, 0.0, 0.0),
                ..Camera::default()
            },
        ];
        for camera in bad {
            assert!(matches!(camera.validate(), Err(PlanetError::InvalidCamera(_))));
        }
        assert!(Camera::default().validate().is_ok());
    }

    #[test]
    fn test_from_config_starts_at_configured_height() {
        let config = CameraConfig::default();
        let camera = Camera::from_config(&config);
        let geo = camera.geodetic();
        assert!((geo.height - config.start_height_m).abs() < 1.0);
        assert_eq!(camera.viewport_height, config.viewport_height);
        assert!(camera.validate().is_ok());
    }
}
