//! Per-frame and whole-tree counters.

use std::time::Duration;

/// What one [`Planet::update`](crate::Planet::update) call did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateStats {
    /// The planet was paused and nothing ran.
    pub skipped: bool,
    /// Tiles evaluated from the work-list.
    pub processed: usize,
    /// Work-list entries left for later calls.
    pub remaining: usize,
    pub splits: usize,
    pub merges: usize,
    pub fetches_submitted: usize,
    /// Fetch results applied to live tiles.
    pub results_applied: usize,
    /// Results dropped because their tile or request was gone.
    pub stale_results: usize,
    pub fetch_failures: usize,
    pub elapsed: Duration,
}

/// Snapshot of the tile tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanetStats {
    pub tiles: usize,
    pub leaves: usize,
    pub visible: usize,
    pub loading: usize,
    pub ready: usize,
    pub errored: usize,
    pub deepest_level: u8,
    /// Bytes held by tile meshes and grids.
    pub mesh_bytes: usize,
    /// Bytes held by tile textures.
    pub texture_bytes: usize,
    /// Fetches this planet is waiting on.
    pub pending_fetches: usize,
}
