//! Terrain data for planet tiles: elevation and imagery sources, tile mesh
//! construction with skirts, and the worker pool that runs both off the
//! caller's thread.

mod error;
mod grid;
mod heightmap;
mod imagery;
mod mesh;
mod procedural;
mod source;

pub mod scheduler;

pub use error::{FetchError, SchedulerError, SourceError};
pub use grid::ElevationGrid;
pub use heightmap::{HeightmapParams, HeightmapSampler};
pub use imagery::{ImageryRequest, ImagerySource, ImageryTexture, ProceduralImagery};
pub use mesh::{
    MeshBuffers, MeshParams, TileMesh, TileVertex, build_ellipsoid_mesh, build_tile_mesh,
    sanitize_elevations,
};
pub use procedural::ProceduralElevation;
pub use scheduler::{
    FetchKind, FetchResult, FetchTicket, JobOutput, RequestId, SchedulerClient, TileJob,
    TileLoadScheduler,
};
pub use source::{ElevationRequest, ElevationSource, wrap_position};
