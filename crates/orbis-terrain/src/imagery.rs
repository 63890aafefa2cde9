//! Imagery source contract and built-in procedural imagery.
//!
//! Textures are RGBA8 with row 0 on the southern edge of the tile, so tile
//! mesh UVs (`v = 0` at `min_lat`) index texels directly.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use orbis_config::{ImageryConfig, ImagerySourceKind};
use orbis_geodesy::TileBounds;

use crate::error::SourceError;

/// A request for one tile's texture.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageryRequest {
    /// Tile bounds in radians.
    pub bounds: TileBounds,
    /// Texture edge length in texels.
    pub size: u32,
}

/// An RGBA8 texture owned by a single tile (or shared read-only with its
/// descendants through an ancestor binding).
#[derive(Clone, Debug, PartialEq)]
pub struct ImageryTexture {
    pub width: u32,
    pub height: u32,
    pub texels: Arc<[u8]>,
}

impl ImageryTexture {
    /// Wrap texels, checking that the buffer holds `width * height` RGBA pixels.
    pub fn new(width: u32, height: u32, texels: Vec<u8>) -> Result<Self, SourceError> {
        let expected = width as usize * height as usize * 4;
        if texels.len() != expected {
            return Err(SourceError::SizeMismatch {
                expected,
                actual: texels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            texels: texels.into(),
        })
    }

    /// RGBA of texel `(x, y)`, row 0 at the south edge.
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.texels[i],
            self.texels[i + 1],
            self.texels[i + 2],
            self.texels[i + 3],
        ]
    }

    /// Bytes held by the texture.
    pub fn byte_size(&self) -> usize {
        self.texels.len()
    }
}

/// A source of tile textures.
pub trait ImagerySource: Send + Sync {
    /// Produce the texture covering `request.bounds`.
    fn texture(&self, request: &ImageryRequest) -> Result<ImageryTexture, SourceError>;

    /// Colour shown on tiles for which no texture is loaded anywhere in
    /// their ancestry.
    fn base_color(&self) -> [u8; 4];
}

/// Procedural imagery families.
#[derive(Clone, Debug, PartialEq)]
pub enum ProceduralImagery {
    /// Alternating cells of `cell_degrees` size.
    Checker {
        cell_degrees: f64,
        base_color: [u8; 4],
    },
    /// Ocean near the equator fading to land, ice above `ice_latitude`.
    LatitudeBands {
        ice_latitude: f64,
        base_color: [u8; 4],
    },
}

const CHECKER_LIGHT: [u8; 4] = [220, 220, 220, 255];
const CHECKER_DARK: [u8; 4] = [60, 60, 60, 255];
const OCEAN: [f64; 3] = [24.0, 70.0, 140.0];
const LAND: [f64; 3] = [92.0, 128.0, 64.0];
const ICE: [u8; 4] = [236, 240, 245, 255];

impl ProceduralImagery {
    /// Build the source selected in the imagery config.
    pub fn from_config(config: &ImageryConfig) -> Self {
        match config.source {
            ImagerySourceKind::Checker => Self::Checker {
                cell_degrees: 10.0,
                base_color: config.base_color,
            },
            ImagerySourceKind::LatitudeBands => Self::LatitudeBands {
                ice_latitude: 66.5f64.to_radians(),
                base_color: config.base_color,
            },
        }
    }

    /// Colour at a single position.
    pub fn color_at(&self, lon: f64, lat: f64) -> [u8; 4] {
        match self {
            Self::Checker { cell_degrees, .. } => {
                let cx = (lon.to_degrees() / cell_degrees).floor() as i64;
                let cy = (lat.to_degrees() / cell_degrees).floor() as i64;
                if (cx + cy).rem_euclid(2) == 0 {
                    CHECKER_LIGHT
                } else {
                    CHECKER_DARK
                }
            }
            Self::LatitudeBands { ice_latitude, .. } => {
                let abs_lat = lat.abs();
                if abs_lat >= *ice_latitude {
                    return ICE;
                }
                let t = (abs_lat / ice_latitude.min(FRAC_PI_2)).clamp(0.0, 1.0);
                let mix = |i: usize| (OCEAN[i] + (LAND[i] - OCEAN[i]) * t).round() as u8;
                [mix(0), mix(1), mix(2), 255]
            }
        }
    }
}

impl ImagerySource for ProceduralImagery {
    fn texture(&self, request: &ImageryRequest) -> Result<ImageryTexture, SourceError> {
        if request.size == 0 {
            return Err(SourceError::InvalidRequest(
                "texture size must be at least 1".to_string(),
            ));
        }
        let size = request.size as usize;
        let bounds = &request.bounds;
        let mut texels = Vec::with_capacity(size * size * 4);
        for y in 0..size {
            // texel centres
            let lat = bounds.min_lat() + (y as f64 + 0.5) / size as f64 * bounds.height();
            for x in 0..size {
                let lon = bounds.min_lon() + (x as f64 + 0.5) / size as f64 * bounds.width();
                texels.extend_from_slice(&self.color_at(lon, lat));
            }
        }
        ImageryTexture::new(request.size, request.size, texels)
    }

    fn base_color(&self) -> [u8; 4] {
        match self {
            Self::Checker { base_color, .. } | Self::LatitudeBands { base_color, .. } => {
                *base_color
            }
        }
    }
}
