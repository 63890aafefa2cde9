//! Multi-octave fractal Brownian motion (fBm) sampler over the unit sphere.
//!
//! Composites octaves of simplex noise evaluated at the 3D unit-sphere
//! direction of a longitude/latitude, so there is no seam at the
//! antimeridian and no pinching at the poles.

use glam::DVec3;
use noise::{NoiseFn, Simplex};

/// Configuration for multi-octave fBm noise.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    /// Seed for deterministic generation.
    pub seed: u32,
    /// Number of noise octaves to composite. A request may lower this.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves. Default: 2.0.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves. Default: 0.5.
    pub persistence: f64,
    /// Frequency of the first octave on the unit sphere. Default: 1.5.
    pub base_frequency: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 13,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.5,
        }
    }
}

/// fBm over simplex noise, normalized to `[-1, 1]`.
pub struct HeightmapSampler {
    noise: Simplex,
    params: HeightmapParams,
}

impl HeightmapSampler {
    /// Create a new sampler with the given parameters.
    pub fn new(params: HeightmapParams) -> Self {
        let noise = Simplex::new(params.seed);
        Self { noise, params }
    }

    /// Unit-sphere direction of a longitude/latitude in radians.
    pub fn direction(lon: f64, lat: f64) -> DVec3 {
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
    }

    /// Raw fBm at a unit-sphere direction using at most `max_octaves` octaves.
    ///
    /// The range is `[-max_amplitude(n), max_amplitude(n)]` for the octave
    /// count `n` actually used.
    pub fn sample_3d(&self, point: DVec3, max_octaves: u32) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = 1.0;

        for _ in 0..self.octaves(max_octaves) {
            let p = point * frequency;
            total += self.noise.get([p.x, p.y, p.z]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total
    }

    /// fBm at a longitude/latitude divided by the theoretical maximum, in `[-1, 1]`.
    pub fn sample_normalized(&self, lon: f64, lat: f64, max_octaves: u32) -> f64 {
        let raw = self.sample_3d(Self::direction(lon, lat), max_octaves);
        let max = self.max_amplitude(max_octaves);
        if max > 0.0 {
            (raw / max).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }

    /// Geometric sum of the octave amplitudes actually used.
    pub fn max_amplitude(&self, max_octaves: u32) -> f64 {
        let mut sum = 0.0;
        let mut amp = 1.0;
        for _ in 0..self.octaves(max_octaves) {
            sum += amp;
            amp *= self.params.persistence;
        }
        sum
    }

    /// Return a reference to the current parameters.
    pub fn params(&self) -> &HeightmapParams {
        &self.params
    }

    fn octaves(&self, max_octaves: u32) -> u32 {
        self.params.octaves.min(max_octaves)
    }
}
