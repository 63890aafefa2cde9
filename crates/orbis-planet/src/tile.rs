//! A node of the planet quad-tree and its per-kind fetch state machine.

use orbis_geodesy::TileBounds;
use orbis_terrain::{FetchKind, FetchTicket, ImageryTexture, RequestId, TileMesh};

use crate::arena::TileKey;
use crate::frustum::BoundingSphere;

/// Load state of one data kind on a tile.
///
/// `Empty → Loading → Ready`, `Loading → Error` on failure, `Error → Loading`
/// on retry once the backoff elapsed, `Ready → Loading` when re-fetched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadState {
    #[default]
    Empty,
    Loading,
    Ready,
    Error,
}

/// What a failed fetch means for the tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Try again once `frame` is reached.
    RetryAt { frame: u64 },
    /// The retry limit is spent.
    Exhausted,
}

/// Fetch bookkeeping for one data kind of one tile.
#[derive(Debug, Default)]
pub struct FetchSlot {
    state: LoadState,
    ticket: Option<FetchTicket>,
    failures: u32,
    retry_at: u64,
    stale: bool,
}

impl FetchSlot {
    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn ticket(&self) -> Option<&FetchTicket> {
        self.ticket.as_ref()
    }

    /// `true` when a fetch should be submitted on frame `frame`.
    pub fn wants_fetch(&self, frame: u64, retry_limit: u32) -> bool {
        match self.state {
            LoadState::Empty => true,
            LoadState::Ready => self.stale,
            LoadState::Error => self.failures < retry_limit && frame >= self.retry_at,
            LoadState::Loading => false,
        }
    }

    /// The fetch behind `ticket` was accepted by the scheduler.
    pub fn begin(&mut self, ticket: FetchTicket) {
        debug_assert!(self.ticket.is_none(), "one outstanding fetch per slot");
        self.state = LoadState::Loading;
        self.ticket = Some(ticket);
        self.stale = false;
    }

    /// `true` if `id` is the fetch this slot is waiting for.
    pub fn is_waiting_for(&self, id: RequestId) -> bool {
        self.state == LoadState::Loading && self.ticket.as_ref().is_some_and(|t| t.id() == id)
    }

    pub fn complete(&mut self) {
        self.state = LoadState::Ready;
        self.ticket = None;
        self.failures = 0;
    }

    /// Record a failure; the next attempt waits `backoff * 2^(n-1)` frames.
    pub fn fail(&mut self, frame: u64, backoff_frames: u32, retry_limit: u32) -> FailureOutcome {
        self.state = LoadState::Error;
        self.ticket = None;
        self.failures = self.failures.saturating_add(1);
        if self.failures >= retry_limit {
            return FailureOutcome::Exhausted;
        }
        let shift = (self.failures - 1).min(16);
        let wait = u64::from(backoff_frames) << shift;
        self.retry_at = frame.saturating_add(wait);
        FailureOutcome::RetryAt {
            frame: self.retry_at,
        }
    }

    /// Give up the outstanding fetch, returning its ticket for cancellation.
    ///
    /// A slot that still holds older data goes back to `Ready` and asks for a
    /// new fetch, one without data goes back to `Empty`.
    pub fn abandon(&mut self, has_data: bool) -> Option<FetchTicket> {
        let ticket = self.ticket.take();
        if self.state == LoadState::Loading {
            if has_data {
                self.state = LoadState::Ready;
                self.stale = true;
            } else {
                self.state = LoadState::Empty;
            }
        }
        ticket
    }

    /// Ask for a re-fetch while keeping the current data.
    pub fn mark_stale(&mut self) {
        match self.state {
            LoadState::Ready => self.stale = true,
            LoadState::Error => self.state = LoadState::Empty,
            LoadState::Empty | LoadState::Loading => {}
        }
    }

    /// Forget earlier failures so a failed slot is tried again.
    pub fn clear_failures(&mut self) {
        self.failures = 0;
        self.retry_at = 0;
        if self.state == LoadState::Error {
            self.state = LoadState::Empty;
        }
    }
}

/// A node of the planet quad-tree.
#[derive(Debug)]
pub struct PlanetTile {
    pub(crate) bounds: TileBounds,
    pub(crate) level: u8,
    pub(crate) parent: Option<TileKey>,
    pub(crate) children: Option<[TileKey; 4]>,
    pub(crate) elevation: FetchSlot,
    pub(crate) imagery: FetchSlot,
    pub(crate) mesh: Option<TileMesh>,
    pub(crate) texture: Option<ImageryTexture>,
    pub(crate) sphere: BoundingSphere,
    pub(crate) visible: bool,
    pub(crate) sse: f64,
    pub(crate) refinement_blocked: bool,
    pub(crate) ellipsoid_fallback: bool,
}

impl PlanetTile {
    pub(crate) fn new(
        bounds: TileBounds,
        level: u8,
        parent: Option<TileKey>,
        display_heights: (f64, f64),
    ) -> Self {
        Self {
            bounds,
            level,
            parent,
            children: None,
            elevation: FetchSlot::default(),
            imagery: FetchSlot::default(),
            mesh: None,
            texture: None,
            sphere: BoundingSphere::enclosing_tile(&bounds, display_heights),
            visible: false,
            sse: 0.0,
            refinement_blocked: false,
            ellipsoid_fallback: false,
        }
    }

    pub fn bounds(&self) -> &TileBounds {
        &self.bounds
    }

    /// Depth in the tree, 0 for the hemisphere roots.
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn parent(&self) -> Option<TileKey> {
        self.parent
    }

    /// The four children in `[SW, SE, NW, NE]` order.
    pub fn children(&self) -> Option<&[TileKey; 4]> {
        self.children.as_ref()
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    pub fn load_state(&self) -> LoadState {
        self.elevation.state()
    }

    pub fn imagery_state(&self) -> LoadState {
        self.imagery.state()
    }

    pub fn elevation_failures(&self) -> u32 {
        self.elevation.failures()
    }

    pub fn mesh(&self) -> Option<&TileMesh> {
        self.mesh.as_ref()
    }

    pub fn texture(&self) -> Option<&ImageryTexture> {
        self.texture.as_ref()
    }

    pub fn bounding_sphere(&self) -> &BoundingSphere {
        &self.sphere
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Screen-space error from the last traversal that saw the tile.
    pub fn screen_space_error(&self) -> f64 {
        self.sse
    }

    pub fn is_refinement_blocked(&self) -> bool {
        self.refinement_blocked
    }

    /// Showing a locally built ellipsoid instead of fetched terrain.
    pub fn is_ellipsoid_fallback(&self) -> bool {
        self.ellipsoid_fallback
    }

    pub(crate) fn slot(&self, kind: FetchKind) -> &FetchSlot {
        match kind {
            FetchKind::Elevation => &self.elevation,
            FetchKind::Imagery => &self.imagery,
        }
    }

    pub(crate) fn slot_mut(&mut self, kind: FetchKind) -> &mut FetchSlot {
        match kind {
            FetchKind::Elevation => &mut self.elevation,
            FetchKind::Imagery => &mut self.imagery,
        }
    }

    /// Elevation range of the tile's own grid, or `fallback` before any grid
    /// arrived.
    pub(crate) fn height_range(&self, fallback: (f64, f64)) -> (f64, f64) {
        self.mesh
            .as_ref()
            .map_or(fallback, |m| (m.grid.min(), m.grid.max()))
    }

    pub(crate) fn refit_sphere(&mut self, source_range: (f64, f64), exaggeration: f64) {
        let (min, max) = self.height_range(source_range);
        self.sphere =
            BoundingSphere::enclosing_tile(&self.bounds, (min * exaggeration, max * exaggeration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot_wants_fetch() {
        let slot = FetchSlot::default();
        assert_eq!(slot.state(), LoadState::Empty);
        assert!(slot.wants_fetch(0, 3));
    }

    #[test]
    fn test_backoff_doubles_until_exhausted() {
        let mut slot = FetchSlot::default();
        assert_eq!(slot.fail(10, 2, 3), FailureOutcome::RetryAt { frame: 12 });
        assert!(!slot.wants_fetch(11, 3));
        assert!(slot.wants_fetch(12, 3));
        assert_eq!(slot.fail(20, 2, 3), FailureOutcome::RetryAt { frame: 24 });
        assert_eq!(slot.fail(30, 2, 3), FailureOutcome::Exhausted);
        assert_eq!(slot.state(), LoadState::Error);
        assert!(!slot.wants_fetch(u64::MAX, 3));
    }

    #[test]
    fn test_clear_failures_allows_retry() {
        let mut slot = FetchSlot::default();
        slot.fail(0, 1, 1);
        assert!(!slot.wants_fetch(100, 1));
        slot.clear_failures();
        assert_eq!(slot.state(), LoadState::Empty);
        assert!(slot.wants_fetch(0, 1));
    }

    #[test]
    fn test_ready_slot_refetches_only_when_stale() {
        let mut slot = FetchSlot::default();
        slot.complete();
        assert!(!slot.wants_fetch(0, 3));
        slot.mark_stale();
        assert!(slot.wants_fetch(0, 3));
        assert_eq!(slot.state(), LoadState::Ready);
    }

    #[test]
    fn test_abandon_without_ticket() {
        let mut slot = FetchSlot::default();
        assert!(slot.abandon(false).is_none());
        assert_eq!(slot.state(), LoadState::Empty);
    }

    #[test]
    fn test_new_tile_is_empty_leaf() {
        let bounds = TileBounds::western_hemisphere();
        let tile = PlanetTile::new(bounds, 0, None, (0.0, 0.0));
        assert_eq!(tile.level(), 0);
        assert!(!tile.has_children());
        assert_eq!(tile.load_state(), LoadState::Empty);
        assert_eq!(tile.imagery_state(), LoadState::Empty);
        assert!(tile.mesh().is_none());
        assert_eq!(tile.height_range((-5.0, 5.0)), (-5.0, 5.0));
    }
}
