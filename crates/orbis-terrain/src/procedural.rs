//! Built-in elevation sources that need no external data.

use orbis_config::{ElevationSourceKind, TerrainConfig};

use crate::error::SourceError;
use crate::heightmap::{HeightmapParams, HeightmapSampler};
use crate::source::{ElevationRequest, ElevationSource};

/// Procedural elevation families.
pub enum ProceduralElevation {
    /// Zero everywhere.
    Flat,
    /// `offset + amplitude * (cos(lon·f) + cos(lat·f))`.
    Sinusoid {
        offset: f64,
        amplitude: f64,
        frequency: f64,
    },
    /// fBm noise mapped onto `[min, max]`.
    Noise {
        sampler: HeightmapSampler,
        min: f64,
        max: f64,
    },
}

impl ProceduralElevation {
    /// Sinusoid spanning exactly `[min, max]`.
    pub fn sinusoid(min: f64, max: f64, frequency: f64) -> Self {
        Self::Sinusoid {
            offset: (min + max) * 0.5,
            amplitude: (max - min) * 0.25,
            frequency,
        }
    }

    /// Noise spanning `[min, max]`.
    pub fn noise(params: HeightmapParams, min: f64, max: f64) -> Self {
        Self::Noise {
            sampler: HeightmapSampler::new(params),
            min,
            max,
        }
    }

    /// Build the source selected in the terrain config.
    pub fn from_config(config: &TerrainConfig) -> Self {
        match config.source {
            ElevationSourceKind::Flat => Self::Flat,
            ElevationSourceKind::Sinusoid => Self::sinusoid(
                config.min_height_m,
                config.max_height_m,
                config.sinusoid_frequency,
            ),
            ElevationSourceKind::Noise => Self::noise(
                HeightmapParams {
                    seed: config.seed,
                    octaves: config.max_octaves,
                    lacunarity: config.lacunarity,
                    persistence: config.persistence,
                    base_frequency: config.base_frequency,
                },
                config.min_height_m,
                config.max_height_m,
            ),
        }
    }

    /// Height at a single position.
    pub fn height_at(&self, lon: f64, lat: f64, max_octaves: u32) -> f64 {
        match self {
            Self::Flat => 0.0,
            Self::Sinusoid {
                offset,
                amplitude,
                frequency,
            } => offset + amplitude * ((lon * frequency).cos() + (lat * frequency).cos()),
            Self::Noise { sampler, min, max } => {
                let n = sampler.sample_normalized(lon, lat, max_octaves);
                (n + 1.0) * 0.5 * (max - min) + min
            }
        }
    }
}

impl ElevationSource for ProceduralElevation {
    fn elevation(&self, request: &ElevationRequest) -> Result<Vec<f64>, SourceError> {
        request.validate()?;
        Ok(request.fill(|lon, lat| self.height_at(lon, lat, request.max_octaves)))
    }

    fn height_range(&self) -> (f64, f64) {
        match self {
            Self::Flat => (0.0, 0.0),
            Self::Sinusoid {
                offset, amplitude, ..
            } => (offset - 2.0 * amplitude.abs(), offset + 2.0 * amplitude.abs()),
            Self::Noise { min, max, .. } => (*min, *max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_geodesy::TileBounds;

    #[test]
    fn test_flat_is_zero() {
        let source = ProceduralElevation::Flat;
        let request = ElevationRequest::new(TileBounds::western_hemisphere(), 8, 13);
        let samples = source.elevation(&request).unwrap();
        assert_eq!(samples.len(), request.sample_count());
        assert!(samples.iter().all(|&h| h == 0.0));
    }

    #[test]
    fn test_sinusoid_stays_in_range() {
        let source = ProceduralElevation::sinusoid(-10_000.0, 10_000.0, 500.0);
        let (lo, hi) = source.height_range();
        assert_eq!((lo, hi), (-10_000.0, 10_000.0));
        let request = ElevationRequest::new(TileBounds::eastern_hemisphere(), 16, 13);
        for h in source.elevation(&request).unwrap() {
            assert!(h >= lo - 1e-9 && h <= hi + 1e-9, "{h} outside [{lo}, {hi}]");
        }
        // cos(0) + cos(0) peaks at the origin
        assert!((source.height_at(0.0, 0.0, 0) - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_noise_stays_in_range_and_is_deterministic() {
        let config = TerrainConfig::default();
        let source = ProceduralElevation::from_config(&config);
        let bounds = TileBounds::from_degrees(10.0, 40.0, 11.0, 41.0).unwrap();
        let request = ElevationRequest::new(bounds, 16, 13);
        let a = source.elevation(&request).unwrap();
        let b = source.elevation(&request).unwrap();
        assert_eq!(a, b);
        for h in a {
            assert!(h >= config.min_height_m && h <= config.max_height_m);
        }
    }

    #[test]
    fn test_invalid_request_is_an_error() {
        let source = ProceduralElevation::Flat;
        let request = ElevationRequest::new(TileBounds::world(), 1, 13);
        assert!(matches!(
            source.elevation(&request),
            Err(SourceError::InvalidRequest(_))
        ));
    }
}
