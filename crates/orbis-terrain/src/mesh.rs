//! Tile mesh construction from an extended elevation grid.
//!
//! Vertices hold the ellipsoid surface point relative to the tile centre
//! (the *shift*) plus the raw elevation. The renderer displaces each vertex
//! by `height * exaggeration` along `up`, which keeps exaggeration a pure
//! display scalar: changing it never requires rebuilding a mesh.
//!
//! Every tile also carries a skirt: a strip hanging from the border ring
//! down by a depth proportional to the tile size, hiding cracks between
//! neighbours at different levels.

use bytemuck::{Pod, Zeroable};
use glam::DVec3;
use orbis_geodesy::{WGS84_A, forward, surface_normal};

use crate::error::SourceError;
use crate::grid::ElevationGrid;
use crate::source::ElevationRequest;

/// GPU vertex of a tile surface or skirt.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TileVertex {
    /// Ellipsoid surface point relative to [`TileMesh::shift`], meters.
    pub position: [f32; 3],
    /// Geodetic up, the displacement direction.
    pub up: [f32; 3],
    /// Terrain shading normal at unit exaggeration.
    pub normal: [f32; 3],
    /// Texture coordinate, `(0, 0)` at the south-west corner.
    pub uv: [f32; 2],
    /// Elevation in meters.
    pub height: f32,
}

static_assertions::assert_eq_size!(TileVertex, [u8; 48]);

/// A vertex buffer with its triangle list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuffers {
    pub vertices: Vec<TileVertex>,
    pub indices: Vec<u32>,
}

impl MeshBuffers {
    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(self.vertices.as_slice())
            + std::mem::size_of_val(self.indices.as_slice())
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Mesh-building knobs that travel with every elevation job.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshParams {
    /// Skirt depth as a fraction of the tile's ground height.
    pub skirt_depth_factor: f64,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            skirt_depth_factor: 0.02,
        }
    }
}

/// Everything a worker hands back for one elevation fetch.
#[derive(Clone, Debug)]
pub struct TileMesh {
    /// Surface triangles.
    pub surface: MeshBuffers,
    /// Skirt triangles.
    pub skirt: MeshBuffers,
    /// Earth-centred origin of the vertex positions (tile centre at height 0).
    pub shift: DVec3,
    /// Trimmed, sanitized elevations used for queries and bounding volumes.
    pub grid: ElevationGrid,
    /// Number of samples that had to be clamped.
    pub sanitized: usize,
}

impl TileMesh {
    /// Bytes held by both vertex/index buffers and the grid.
    pub fn byte_size(&self) -> usize {
        self.surface.byte_size()
            + self.skirt.byte_size()
            + std::mem::size_of_val(self.grid.samples())
    }
}

/// Clamp NaN, infinite and out-of-range samples into `range`.
///
/// NaN becomes the value in `range` closest to zero. Returns the number of
/// samples that were changed.
pub fn sanitize_elevations(samples: &mut [f64], range: (f64, f64)) -> usize {
    let (min, max) = range;
    let mut fixed = 0;
    for h in samples.iter_mut() {
        let clamped = if h.is_nan() {
            0.0_f64.clamp(min, max)
        } else {
            h.clamp(min, max)
        };
        // NaN compares unequal to everything, so it is always counted
        if clamped != *h {
            *h = clamped;
            fixed += 1;
        }
    }
    fixed
}

/// Build surface and skirt meshes from an extended grid.
///
/// `extended` is sanitized in place against `height_range` before use.
pub fn build_tile_mesh(
    request: &ElevationRequest,
    mut extended: Vec<f64>,
    height_range: (f64, f64),
    params: &MeshParams,
) -> Result<TileMesh, SourceError> {
    request.validate()?;
    if extended.len() != request.sample_count() {
        return Err(SourceError::SizeMismatch {
            expected: request.sample_count(),
            actual: extended.len(),
        });
    }
    let sanitized = sanitize_elevations(&mut extended, height_range);

    let bounds = request.bounds;
    let (center_lon, center_lat) = bounds.center();
    let shift = forward(center_lon, center_lat, 0.0);

    let (w, h) = (request.width, request.height);
    let ext_w = request.extended_width();
    let terrain_point = |xe: usize, ye: usize| {
        let (lon, lat) = request.sample_position(xe, ye);
        forward(lon, lat, extended[ye * ext_w + xe])
    };

    let mut vertices = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let (xe, ye) = (x + 1, y + 1);
            let (lon, lat) = request.sample_position(xe, ye);
            let up = surface_normal(lon, lat);
            let east = terrain_point(xe + 1, ye) - terrain_point(xe - 1, ye);
            let north = terrain_point(xe, ye + 1) - terrain_point(xe, ye - 1);
            let normal = east.cross(north).try_normalize().unwrap_or(up);

            vertices.push(TileVertex {
                position: (forward(lon, lat, 0.0) - shift).as_vec3().to_array(),
                up: up.as_vec3().to_array(),
                normal: normal.as_vec3().to_array(),
                uv: [x as f32 / (w - 1) as f32, y as f32 / (h - 1) as f32],
                height: extended[ye * ext_w + xe] as f32,
            });
        }
    }

    let mut indices = Vec::with_capacity((w - 1) * (h - 1) * 6);
    for y in 0..h - 1 {
        for x in 0..w - 1 {
            let i0 = (y * w + x) as u32;
            let i1 = i0 + 1;
            let i2 = i0 + w as u32;
            let i3 = i2 + 1;
            indices.extend_from_slice(&[i0, i1, i3, i0, i3, i2]);
        }
    }

    let skirt_depth = params.skirt_depth_factor * WGS84_A * bounds.height();
    let skirt = build_skirt(&vertices, w, h, skirt_depth);

    let grid = ElevationGrid::from_extended(request, &extended);

    Ok(TileMesh {
        surface: MeshBuffers { vertices, indices },
        skirt,
        shift,
        grid,
        sanitized,
    })
}

/// Flat mesh on the bare ellipsoid, used when a root tile cannot get data.
pub fn build_ellipsoid_mesh(
    request: &ElevationRequest,
    params: &MeshParams,
) -> Result<TileMesh, SourceError> {
    build_tile_mesh(request, vec![0.0; request.sample_count()], (0.0, 0.0), params)
}

/// Indices of the border ring, counter-clockwise from the south-west corner.
fn border_ring(w: usize, h: usize) -> Vec<usize> {
    let mut ring = Vec::with_capacity(2 * (w + h) - 4);
    ring.extend(0..w);
    ring.extend((1..h).map(|y| y * w + w - 1));
    ring.extend((0..w - 1).rev().map(|x| (h - 1) * w + x));
    ring.extend((1..h - 1).rev().map(|y| y * w));
    ring
}

fn build_skirt(surface: &[TileVertex], w: usize, h: usize, depth: f64) -> MeshBuffers {
    let ring = border_ring(w, h);
    let mut vertices = Vec::with_capacity(ring.len() * 2);
    for &i in &ring {
        let top = surface[i];
        let bottom = TileVertex {
            height: (top.height as f64 - depth) as f32,
            ..top
        };
        vertices.push(top);
        vertices.push(bottom);
    }

    let n = ring.len() as u32;
    let mut indices = Vec::with_capacity(ring.len() * 6);
    for i in 0..n {
        let j = (i + 1) % n;
        let (top_i, bottom_i) = (2 * i, 2 * i + 1);
        let (top_j, bottom_j) = (2 * j, 2 * j + 1);
        indices.extend_from_slice(&[top_i, bottom_i, bottom_j, top_i, bottom_j, top_j]);
    }
    MeshBuffers { vertices, indices }
}
