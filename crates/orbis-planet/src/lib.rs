//! Planet quad-tree level of detail: two hemisphere roots refined by
//! screen-space error, culled against the view frustum and the horizon, and
//! fed by asynchronous elevation and imagery fetches.

mod arena;
mod budget;
mod camera;
mod error;
mod frustum;
mod horizon;
mod lod;
mod planet;
mod stats;
mod tile;

pub use arena::{TileArena, TileKey};
pub use budget::FrameBudget;
pub use camera::Camera;
pub use error::PlanetError;
pub use frustum::{BoundingSphere, Frustum};
pub use horizon::HorizonCuller;
pub use lod::{
    LodAction, LodInput, LodPolicy, geometric_error, nearest_point_distance, screen_space_error,
};
pub use planet::{DEFAULT_BASE_COLOR, ImageryBinding, Planet, PlanetBuilder, RenderTile};
pub use stats::{PlanetStats, UpdateStats};
pub use tile::{FailureOutcome, FetchSlot, LoadState, PlanetTile};
