//! Screen-space-error policy deciding when tiles split and merge.

use glam::DVec3;
use orbis_config::PlanetConfig;
use orbis_geodesy::{Geodetic, TileBounds, WGS84_A, forward};

/// Result of evaluating a tile during traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodAction {
    /// Keep the tile as-is.
    Keep,
    /// Split the tile into four children (increase detail).
    Split,
    /// Dispose the tile's children (decrease detail).
    Merge,
}

/// Everything the policy needs to know about one tile.
#[derive(Clone, Copy, Debug, Default)]
pub struct LodInput {
    pub level: u8,
    pub sse: f64,
    pub visible: bool,
    pub ready: bool,
    pub has_children: bool,
    /// None of the children has children of its own.
    pub children_are_leaves: bool,
    pub refinement_blocked: bool,
    /// The tree is below its soft tile cap.
    pub can_grow: bool,
}

/// Split/merge thresholds in pixels plus the depth limit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodPolicy {
    pub split_threshold: f64,
    pub merge_threshold: f64,
    pub max_level: u8,
}

impl LodPolicy {
    /// `source_max_level` caps the configured depth for sources with
    /// limited resolution.
    pub fn from_config(config: &PlanetConfig, source_max_level: u8) -> Self {
        let split_threshold = config.max_screen_space_error / config.detail_multiplier;
        Self {
            split_threshold,
            merge_threshold: split_threshold * config.merge_ratio,
            max_level: config.max_level.min(source_max_level),
        }
    }

    pub fn decide(&self, input: &LodInput) -> LodAction {
        if input.has_children {
            let coarser = !input.visible
                || input.sse < self.merge_threshold
                || input.level >= self.max_level;
            if input.children_are_leaves && coarser {
                return LodAction::Merge;
            }
            return LodAction::Keep;
        }
        let wants_detail = input.sse > self.split_threshold && input.level < self.max_level;
        if input.visible
            && input.ready
            && input.can_grow
            && !input.refinement_blocked
            && wants_detail
        {
            LodAction::Split
        } else {
            LodAction::Keep
        }
    }
}

/// Angular vertex spacing of a tile in meters, measured along its widest
/// parallel.
pub fn geometric_error(bounds: &TileBounds, tile_size: usize) -> f64 {
    let lat_near = 0.0_f64.clamp(bounds.min_lat(), bounds.max_lat());
    WGS84_A * bounds.width() * lat_near.cos() / tile_size.max(1) as f64
}

/// Projected error in pixels for a tile seen from `distance` meters.
///
/// `sse_factor` is `viewport_height / (2 * tan(fov_y / 2))`.
pub fn screen_space_error(geometric_error: f64, distance: f64, sse_factor: f64) -> f64 {
    geometric_error * sse_factor / distance.max(1.0)
}

/// Distance from the camera to the closest point of a tile whose surface
/// lies between `heights`.
///
/// The camera's longitude, latitude and height are clamped into the tile;
/// longitude clamping picks the nearer edge across the antimeridian.
pub fn nearest_point_distance(
    camera_pos: DVec3,
    camera: &Geodetic,
    bounds: &TileBounds,
    heights: (f64, f64),
) -> f64 {
    let lon = clamp_longitude(camera.lon, bounds);
    let lat = camera.lat.clamp(bounds.min_lat(), bounds.max_lat());
    let height = camera.height.clamp(heights.0.min(heights.1), heights.0.max(heights.1));
    camera_pos.distance(forward(lon, lat, height))
}

fn clamp_longitude(lon: f64, bounds: &TileBounds) -> f64 {
    if lon >= bounds.min_lon() && lon <= bounds.max_lon() {
        return lon;
    }
    let gap = |edge: f64| {
        let d = (lon - edge).rem_euclid(std::f64::consts::TAU);
        d.min(std::f64::consts::TAU - d)
    };
    if gap(bounds.min_lon()) <= gap(bounds.max_lon()) {
        bounds.min_lon()
    } else {
        bounds.max_lon()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LodPolicy {
        LodPolicy::from_config(&PlanetConfig::default(), u8::MAX)
    }

    fn leaf(sse: f64) -> LodInput {
        LodInput {
            level: 3,
            sse,
            visible: true,
            ready: true,
            can_grow: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_thresholds_follow_detail_multiplier() {
        let config = PlanetConfig {
            detail_multiplier: 2.0,
            max_screen_space_error: 32.0,
            merge_ratio: 0.5,
            max_level: 10,
            ..PlanetConfig::default()
        };
        let p = LodPolicy::from_config(&config, 6);
        assert_eq!(p.split_threshold, 16.0);
        assert_eq!(p.merge_threshold, 8.0);
        assert_eq!(p.max_level, 6);
    }

    #[test]
    fn test_split_only_when_ready_and_visible() {
        let p = policy();
        assert_eq!(p.decide(&leaf(100.0)), LodAction::Split);
        assert_eq!(p.decide(&leaf(10.0)), LodAction::Keep);
        assert_eq!(p.decide(&LodInput { ready: false, ..leaf(100.0) }), LodAction::Keep);
        assert_eq!(p.decide(&LodInput { visible: false, ..leaf(100.0) }), LodAction::Keep);
        assert_eq!(
            p.decide(&LodInput { refinement_blocked: true, ..leaf(100.0) }),
            LodAction::Keep
        );
        assert_eq!(p.decide(&LodInput { can_grow: false, ..leaf(100.0) }), LodAction::Keep);
        assert_eq!(
            p.decide(&LodInput { level: p.max_level, ..leaf(100.0) }),
            LodAction::Keep
        );
    }

    #[test]
    fn test_merge_hysteresis() {
        let p = policy();
        let parent = |sse| LodInput {
            has_children: true,
            children_are_leaves: true,
            ..leaf(sse)
        };
        // Between the merge and split thresholds nothing changes.
        assert_eq!(p.decide(&parent(20.0)), LodAction::Keep);
        assert_eq!(p.decide(&parent(10.0)), LodAction::Merge);
        // Only bottom-up.
        assert_eq!(
            p.decide(&LodInput { children_are_leaves: false, ..parent(1.0) }),
            LodAction::Keep
        );
        // Children below a lowered depth cap collapse.
        assert_eq!(
            p.decide(&LodInput { level: p.max_level, ..parent(100.0) }),
            LodAction::Merge
        );
    }

    #[test]
    fn test_offscreen_subtree_merges() {
        let p = policy();
        let input = LodInput {
            has_children: true,
            children_are_leaves: true,
            visible: false,
            ..leaf(1000.0)
        };
        assert_eq!(p.decide(&input), LodAction::Merge);
    }

    #[test]
    fn test_root_geometric_error() {
        let err = geometric_error(&TileBounds::eastern_hemisphere(), 32);
        assert!((err - WGS84_A * std::f64::consts::PI / 32.0).abs() < 1e-6);
        // Polar tiles use their equator-most latitude.
        let polar = TileBounds::from_degrees(0.0, 60.0, 10.0, 70.0).unwrap();
        let expected = WGS84_A * 10f64.to_radians() * 60f64.to_radians().cos() / 32.0;
        assert!((geometric_error(&polar, 32) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_root_error_below_threshold_from_orbit() {
        // 60° fov, 1080 px, camera 40,000 km up
        let factor = 1080.0 / (2.0 * (30f64.to_radians()).tan());
        let err = geometric_error(&TileBounds::western_hemisphere(), 32);
        let sse = screen_space_error(err, 4.0e7, factor);
        assert!(sse < 32.0, "root sse {sse} should not split from orbit");
        assert!(screen_space_error(err, 1.0e5, factor) > 32.0);
    }

    #[test]
    fn test_nearest_distance_above_tile_is_height() {
        let bounds = TileBounds::from_degrees(0.0, 0.0, 1.0, 1.0).unwrap();
        let geo = Geodetic::from_degrees(0.5, 0.5, 1000.0);
        let d = nearest_point_distance(geo.to_cartesian(), &geo, &bounds, (0.0, 100.0));
        assert!((d - 900.0).abs() < 1e-3);
    }

    #[test]
    fn test_nearest_distance_wraps_antimeridian() {
        let bounds = TileBounds::from_degrees(-180.0, 0.0, -170.0, 10.0).unwrap();
        let geo = Geodetic::from_degrees(179.0, 5.0, 0.0);
        let d = nearest_point_distance(geo.to_cartesian(), &geo, &bounds, (0.0, 0.0));
        // one degree of longitude at 5° latitude, not 19
        assert!(d < 120_000.0, "distance {d} took the long way round");
    }
}
