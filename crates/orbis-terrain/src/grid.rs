//! Trimmed per-tile elevation grid with bilinear lookup.

use orbis_geodesy::TileBounds;

use crate::source::ElevationRequest;

/// Heights of one tile, `width × height` samples, south row first.
///
/// The corners of the grid coincide with the corners of `bounds`.
#[derive(Clone, Debug, PartialEq)]
pub struct ElevationGrid {
    bounds: TileBounds,
    width: usize,
    height: usize,
    samples: Vec<f64>,
    min: f64,
    max: f64,
}

impl ElevationGrid {
    /// Drop the outer ring of an extended grid.
    ///
    /// `extended` must hold `request.sample_count()` values.
    pub fn from_extended(request: &ElevationRequest, extended: &[f64]) -> Self {
        let ext_w = request.extended_width();
        let mut samples = Vec::with_capacity(request.width * request.height);
        for y in 1..=request.height {
            let row = y * ext_w;
            samples.extend_from_slice(&extended[row + 1..row + 1 + request.width]);
        }
        Self::new(request.bounds, request.width, request.height, samples)
    }

    /// Build a grid from trimmed samples.
    pub fn new(bounds: TileBounds, width: usize, height: usize, samples: Vec<f64>) -> Self {
        debug_assert_eq!(samples.len(), width * height);
        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            });
        Self {
            bounds,
            width,
            height,
            samples,
            min,
            max,
        }
    }

    /// A grid of zeros, used for the ellipsoid fallback mesh.
    pub fn flat(bounds: TileBounds, width: usize, height: usize) -> Self {
        Self::new(bounds, width, height, vec![0.0; width * height])
    }

    pub fn bounds(&self) -> &TileBounds {
        &self.bounds
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Lowest sample.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Highest sample.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Sample at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.samples[y * self.width + x]
    }

    /// Bilinear interpolation at `(lon, lat)`, clamped into the tile.
    pub fn sample(&self, lon: f64, lat: f64) -> f64 {
        let (lon, lat) = self.bounds.clamp_point(lon, lat);
        let (u, v) = self.bounds.uv_of(lon, lat);
        let fx = u * (self.width - 1) as f64;
        let fy = v * (self.height - 1) as f64;

        let x0 = (fx.floor() as usize).min(self.width - 2);
        let y0 = (fy.floor() as usize).min(self.height - 2);
        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let h00 = self.get(x0, y0);
        let h10 = self.get(x0 + 1, y0);
        let h01 = self.get(x0, y0 + 1);
        let h11 = self.get(x0 + 1, y0 + 1);

        let south = h00 + (h10 - h00) * tx;
        let north = h01 + (h11 - h01) * tx;
        south + (north - south) * ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_grid() -> ElevationGrid {
        // h = 10 * column + 100 * row
        let bounds = TileBounds::new(0.0, 0.0, 0.2, 0.2).unwrap();
        let samples = (0..3)
            .flat_map(|y| (0..3).map(move |x| (10 * x + 100 * y) as f64))
            .collect();
        ElevationGrid::new(bounds, 3, 3, samples)
    }

    #[test]
    fn test_corners_match_samples() {
        let grid = ramp_grid();
        assert_eq!(grid.sample(0.0, 0.0), 0.0);
        assert!((grid.sample(0.2, 0.0) - 20.0).abs() < 1e-9);
        assert!((grid.sample(0.2, 0.2) - 220.0).abs() < 1e-9);
        assert_eq!(grid.min(), 0.0);
        assert_eq!(grid.max(), 220.0);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let grid = ramp_grid();
        let h = grid.sample(0.05, 0.15);
        // column 0.5, row 1.5
        assert!((h - 155.0).abs() < 1e-9, "got {h}");
    }

    #[test]
    fn test_outside_points_are_clamped() {
        let grid = ramp_grid();
        assert_eq!(grid.sample(-1.0, -1.0), 0.0);
        assert!((grid.sample(1.0, 1.0) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_extended_drops_ring() {
        let bounds = TileBounds::new(0.0, 0.0, 0.1, 0.1).unwrap();
        let request = ElevationRequest::new(bounds, 2, 1);
        // 4x4 extended grid, inner 2x2 marked.
        let mut extended = vec![-1.0; 16];
        extended[5] = 1.0;
        extended[6] = 2.0;
        extended[9] = 3.0;
        extended[10] = 4.0;
        let grid = ElevationGrid::from_extended(&request, &extended);
        assert_eq!(grid.samples(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
