//! View-frustum culling of tile bounding spheres.
//!
//! Planes are extracted from the camera's reverse-Z view-projection matrix
//! with the Griggs-Hartmann method, in `f64` ECEF space.

use glam::{DMat4, DVec3, DVec4};
use orbis_geodesy::{TileBounds, forward};

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Lattice resolution used when fitting a sphere around a tile.
const SPHERE_SAMPLES: usize = 5;

/// A sphere enclosing all of a tile's geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    /// Sphere enclosing the tile surface for elevations in `heights`.
    ///
    /// Samples a lattice over the bounds at both heights, centres the sphere
    /// on their mean and pads the radius with the sagitta of one lattice cell
    /// so the curved surface between samples stays inside.
    pub fn enclosing_tile(bounds: &TileBounds, heights: (f64, f64)) -> Self {
        let (low, high) = (heights.0.min(heights.1), heights.0.max(heights.1));
        let steps = (SPHERE_SAMPLES - 1) as f64;

        let mut points = Vec::with_capacity(SPHERE_SAMPLES * SPHERE_SAMPLES * 2);
        for j in 0..SPHERE_SAMPLES {
            let lat = bounds.min_lat() + bounds.height() * j as f64 / steps;
            for i in 0..SPHERE_SAMPLES {
                let lon = bounds.min_lon() + bounds.width() * i as f64 / steps;
                points.push(forward(lon, lat, low));
                points.push(forward(lon, lat, high));
            }
        }

        let center = points.iter().copied().sum::<DVec3>() / points.len() as f64;
        let farthest = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0_f64, f64::max);

        let cell = (bounds.width() / steps).hypot(bounds.height() / steps);
        let outer = orbis_geodesy::WGS84_A + high.max(0.0);
        let sagitta = outer * (1.0 - (cell * 0.5).min(std::f64::consts::FRAC_PI_2).cos());

        Self {
            center,
            radius: farthest + sagitta,
        }
    }

    pub fn contains(&self, point: DVec3) -> bool {
        point.distance(self.center) <= self.radius
    }
}

/// A view frustum defined by six inward-pointing planes extracted from
/// the view-projection matrix.
#[derive(Clone, Debug)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far. `(a, b, c)` is the
    /// normalized inward normal and `d` the signed distance term.
    planes: [DVec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a reverse-Z view-projection matrix.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [DVec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        // reverse-Z: depth 1 at near, 0 at far
        planes[NEAR] = rows[3] - rows[2];
        planes[FAR] = rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Signed distance from `point` to each plane, positive inside.
    pub fn distances(&self, point: DVec3) -> [f64; 6] {
        self.planes.map(|p| p.truncate().dot(point) + p.w)
    }

    /// `true` if any part of the sphere may be inside the frustum.
    ///
    /// Conservative near the frustum corners.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.distances(sphere.center)
            .iter()
            .all(|&d| d >= -sphere.radius)
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.distances(point).iter().all(|&d| d >= 0.0)
    }
}
