//! Planet orchestration: the two hemisphere roots, the time-budgeted
//! traversal, fetch integration and the queries navigation relies on.
//!
//! All tree mutation happens on the thread calling [`Planet::update`]. Workers
//! only build meshes and textures; their results are drained at the start of
//! each update and matched back to tiles through the pending-request map and
//! the arena's generation check, so results for disposed tiles are dropped.

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::sync::Arc;

use glam::DVec3;
use orbis_config::{Config, ConfigError, PlanetConfig, SchedulerConfig};
use orbis_geodesy::{Geodetic, TileBounds, forward, inverse};
use orbis_terrain::{
    ElevationGrid, ElevationRequest, ElevationSource, FetchKind, FetchResult, ImageryRequest,
    ImagerySource, ImageryTexture, JobOutput, MeshParams, ProceduralElevation, ProceduralImagery,
    RequestId, SchedulerClient, SchedulerError, TileJob, TileLoadScheduler, TileMesh,
    build_ellipsoid_mesh,
};
use rustc_hash::FxHashMap;

use crate::arena::{TileArena, TileKey};
use crate::budget::FrameBudget;
use crate::camera::Camera;
use crate::error::PlanetError;
use crate::frustum::{BoundingSphere, Frustum};
use crate::horizon::HorizonCuller;
use crate::lod::{
    LodAction, LodInput, LodPolicy, geometric_error, nearest_point_distance, screen_space_error,
};
use crate::stats::{PlanetStats, UpdateStats};
use crate::tile::{FailureOutcome, LoadState, PlanetTile};

/// Colour bound to tiles when no imagery source provides one.
pub const DEFAULT_BASE_COLOR: [u8; 4] = [40, 64, 96, 255];

const KINDS: [FetchKind; 2] = [FetchKind::Elevation, FetchKind::Imagery];

/// How a rendered tile is textured.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImageryBinding<'a> {
    /// The tile's own texture.
    Own(&'a ImageryTexture),
    /// The nearest ancestor's texture, restricted to the tile's footprint.
    Ancestor {
        texture: &'a ImageryTexture,
        level: u8,
        uv_offset: [f32; 2],
        uv_scale: [f32; 2],
    },
    /// Nothing loaded anywhere in the ancestry yet.
    BaseColor([u8; 4]),
}

/// One tile the renderer should draw this frame.
#[derive(Clone, Copy, Debug)]
pub struct RenderTile<'a> {
    pub key: TileKey,
    pub level: u8,
    pub bounds: TileBounds,
    pub mesh: &'a TileMesh,
    pub imagery: ImageryBinding<'a>,
    /// Vertical scale the vertex shader applies to `TileVertex::height`.
    pub exaggeration: f64,
}

/// Camera-derived state shared by every tile evaluated in one update.
struct ViewState {
    position: DVec3,
    geodetic: Geodetic,
    frustum: Frustum,
    horizon: HorizonCuller,
    sse_factor: f64,
}

impl ViewState {
    fn new(camera: &Camera, min_display_height: f64) -> Self {
        Self {
            position: camera.position,
            geodetic: camera.geodetic(),
            frustum: Frustum::from_view_projection(&camera.view_projection_matrix()),
            horizon: HorizonCuller::for_terrain(camera.position, min_display_height),
            sse_factor: camera.sse_factor(),
        }
    }

    fn sees(&self, sphere: &BoundingSphere) -> bool {
        self.frustum.intersects_sphere(sphere) && self.horizon.is_above_horizon(sphere)
    }
}

/// Builder for [`Planet`]. A camera is required.
pub struct PlanetBuilder {
    camera: Option<Camera>,
    config: PlanetConfig,
    tile_size: usize,
    max_octaves: u32,
    mesh_params: MeshParams,
    tile_imagery_size: u32,
    base_color: [u8; 4],
    elevation: Option<Arc<dyn ElevationSource>>,
    imagery: Option<Arc<dyn ImagerySource>>,
    scheduler: Option<Arc<TileLoadScheduler>>,
    scheduler_config: SchedulerConfig,
}

impl Default for PlanetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanetBuilder {
    /// Flat terrain, no imagery, private scheduler, default settings.
    pub fn new() -> Self {
        Self {
            camera: None,
            config: PlanetConfig::default(),
            tile_size: 32,
            max_octaves: 13,
            mesh_params: MeshParams::default(),
            tile_imagery_size: 256,
            base_color: DEFAULT_BASE_COLOR,
            elevation: None,
            imagery: None,
            scheduler: None,
            scheduler_config: SchedulerConfig::default(),
        }
    }

    /// Settings and procedural sources taken from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        let imagery: Option<Arc<dyn ImagerySource>> = if config.imagery.enabled {
            Some(Arc::new(ProceduralImagery::from_config(&config.imagery)))
        } else {
            None
        };
        Self {
            camera: None,
            config: config.planet.clone(),
            tile_size: config.terrain.tile_size as usize,
            max_octaves: config.terrain.max_octaves,
            mesh_params: MeshParams {
                skirt_depth_factor: config.terrain.skirt_depth_factor,
            },
            tile_imagery_size: config.imagery.tile_imagery_size,
            base_color: config.imagery.base_color,
            elevation: Some(Arc::new(ProceduralElevation::from_config(&config.terrain))),
            imagery,
            scheduler: None,
            scheduler_config: config.scheduler.clone(),
        }
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn config(mut self, config: PlanetConfig) -> Self {
        self.config = config;
        self
    }

    /// Samples per tile edge.
    pub fn tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Octave cap handed to the elevation source with every request.
    pub fn max_octaves(mut self, max_octaves: u32) -> Self {
        self.max_octaves = max_octaves;
        self
    }

    pub fn mesh_params(mut self, params: MeshParams) -> Self {
        self.mesh_params = params;
        self
    }

    pub fn tile_imagery_size(mut self, size: u32) -> Self {
        self.tile_imagery_size = size;
        self
    }

    pub fn base_color(mut self, color: [u8; 4]) -> Self {
        self.base_color = color;
        self
    }

    pub fn elevation_source(mut self, source: Arc<dyn ElevationSource>) -> Self {
        self.elevation = Some(source);
        self
    }

    pub fn imagery_source(mut self, source: Option<Arc<dyn ImagerySource>>) -> Self {
        self.imagery = source;
        self
    }

    /// Share an existing worker pool instead of starting a private one.
    pub fn scheduler(mut self, scheduler: Arc<TileLoadScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Settings for the private pool started when none is shared.
    pub fn scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler_config = config;
        self
    }

    pub fn build(self) -> Result<Planet, PlanetError> {
        let camera = self.camera.ok_or(PlanetError::MissingCamera)?;
        camera.validate()?;
        self.config.validate()?;
        if !(2..=256).contains(&self.tile_size) {
            return Err(invalid(
                "terrain.tile_size",
                format!("must be in 2..=256, got {}", self.tile_size),
            ));
        }
        if self.tile_imagery_size == 0 {
            return Err(invalid("imagery.tile_imagery_size", "must be at least 1"));
        }
        let skirt = self.mesh_params.skirt_depth_factor;
        if !(skirt.is_finite() && skirt >= 0.0) {
            return Err(invalid(
                "terrain.skirt_depth_factor",
                format!("must be finite and >= 0, got {skirt}"),
            ));
        }

        let elevation = self
            .elevation
            .unwrap_or_else(|| Arc::new(ProceduralElevation::Flat));
        let source_range = checked_range(elevation.as_ref())?;

        let scheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => {
                self.scheduler_config.validate()?;
                Arc::new(TileLoadScheduler::from_config(&self.scheduler_config)?)
            }
        };

        let policy = LodPolicy::from_config(&self.config, elevation.max_level());
        let exaggeration = self.config.elevation_exaggeration;
        let display = scale_range(source_range, exaggeration);

        let mut tiles = TileArena::new();
        let roots = [
            TileBounds::western_hemisphere(),
            TileBounds::eastern_hemisphere(),
        ]
        .map(|bounds| tiles.insert(PlanetTile::new(bounds, 0, None, display)));

        tracing::info!(
            "Planet ready: tile size {}, max level {}, {} scheduler workers",
            self.tile_size,
            policy.max_level,
            scheduler.worker_count()
        );

        Ok(Planet {
            tiles,
            roots,
            client: SchedulerClient::new(scheduler),
            elevation,
            imagery: self.imagery,
            base_color: self.base_color,
            source_range,
            pending: FxHashMap::default(),
            config: self.config,
            policy,
            tile_size: self.tile_size,
            max_octaves: self.max_octaves,
            mesh_params: self.mesh_params,
            tile_imagery_size: self.tile_imagery_size,
            exaggeration,
            paused: false,
            frame: 0,
            work_list: Vec::new(),
            cursor: 0,
            camera,
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> PlanetError {
    PlanetError::Config(ConfigError::Invalid {
        field,
        reason: reason.into(),
    })
}

fn checked_range(source: &dyn ElevationSource) -> Result<(f64, f64), PlanetError> {
    let (min, max) = source.height_range();
    if min.is_finite() && max.is_finite() && min <= max {
        Ok((min, max))
    } else {
        Err(invalid(
            "terrain.height_range",
            format!("source reports an unusable range [{min}, {max}]"),
        ))
    }
}

fn scale_range(range: (f64, f64), factor: f64) -> (f64, f64) {
    (range.0 * factor, range.1 * factor)
}

/// The planet quad-tree.
pub struct Planet {
    tiles: TileArena<PlanetTile>,
    roots: [TileKey; 2],
    client: SchedulerClient,
    elevation: Arc<dyn ElevationSource>,
    imagery: Option<Arc<dyn ImagerySource>>,
    base_color: [u8; 4],
    source_range: (f64, f64),
    pending: FxHashMap<RequestId, (TileKey, FetchKind)>,
    config: PlanetConfig,
    policy: LodPolicy,
    tile_size: usize,
    max_octaves: u32,
    mesh_params: MeshParams,
    tile_imagery_size: u32,
    exaggeration: f64,
    paused: bool,
    frame: u64,
    work_list: Vec<TileKey>,
    cursor: usize,
    camera: Camera,
}

impl Planet {
    pub fn builder() -> PlanetBuilder {
        PlanetBuilder::new()
    }

    /// Run one time-budgeted slice of the tree update.
    ///
    /// Drains finished fetches, then evaluates tiles from the work-list until
    /// the frame budget is spent (always at least one). The work-list is a
    /// finest-first snapshot of the tree, rebuilt once the cursor reaches its
    /// end. Does nothing while paused.
    pub fn update(&mut self, camera: &Camera) -> UpdateStats {
        let mut stats = UpdateStats::default();
        if self.paused {
            stats.skipped = true;
            return stats;
        }

        let budget = FrameBudget::from_millis_f64(self.config.frame_budget_ms);
        self.frame += 1;
        self.camera = camera.clone();

        for result in self.client.drain() {
            self.apply_result(result, &mut stats);
        }

        let view = ViewState::new(camera, self.display_range().0);
        if self.cursor >= self.work_list.len() {
            self.rebuild_work_list();
        }

        while self.cursor < self.work_list.len() {
            let key = self.work_list[self.cursor];
            self.cursor += 1;
            if !self.tiles.contains(key) {
                // merged away earlier in this pass
                continue;
            }
            self.update_tile(key, &view, &mut stats);
            stats.processed += 1;
            if budget.is_exhausted() {
                break;
            }
        }

        stats.remaining = self.work_list.len() - self.cursor;
        stats.elapsed = budget.elapsed();
        stats
    }

    fn rebuild_work_list(&mut self) {
        self.work_list.clear();
        self.work_list.extend(self.tiles.iter().map(|(key, _)| key));
        let tiles = &self.tiles;
        self.work_list
            .sort_by_key(|key| std::cmp::Reverse(tiles.get(*key).map_or(0, |t| t.level)));
        self.cursor = 0;
    }

    fn update_tile(&mut self, key: TileKey, view: &ViewState, stats: &mut UpdateStats) {
        let tile_size = self.tile_size;
        let (source_range, exaggeration) = (self.source_range, self.exaggeration);
        let can_grow = self.tiles.len() + 4 <= self.config.max_tiles;
        let Some(tile) = self.tiles.get_mut(key) else {
            return;
        };

        tile.visible = view.sees(&tile.sphere);
        tile.sse = if tile.visible {
            let heights = scale_range(tile.height_range(source_range), exaggeration);
            let d = nearest_point_distance(view.position, &view.geodetic, &tile.bounds, heights);
            screen_space_error(geometric_error(&tile.bounds, tile_size), d, view.sse_factor)
        } else {
            0.0
        };

        let mut input = LodInput {
            level: tile.level,
            sse: tile.sse,
            visible: tile.visible,
            ready: tile.elevation.state() == LoadState::Ready,
            has_children: tile.children.is_some(),
            children_are_leaves: false,
            refinement_blocked: tile.refinement_blocked,
            can_grow,
        };
        let children = tile.children;
        let has_mesh = tile.mesh.is_some();

        if input.visible {
            self.submit_if_due(key, FetchKind::Elevation, stats);
            if has_mesh {
                self.submit_if_due(key, FetchKind::Imagery, stats);
            }
            // The parent is drawn until all four children have geometry, so
            // culled or deferred children are fetched too.
            if let Some(children) = children {
                for child in children {
                    self.submit_if_due(child, FetchKind::Elevation, stats);
                }
            }
        }

        if let Some(children) = children {
            input.children_are_leaves = children
                .iter()
                .all(|c| self.tiles.get(*c).is_none_or(|t| t.children.is_none()));
        }

        match self.policy.decide(&input) {
            LodAction::Split => self.split(key, stats),
            LodAction::Merge => {
                self.merge(key);
                stats.merges += 1;
                tracing::debug!("Merged level {} tile (sse {:.1})", input.level, input.sse);
            }
            LodAction::Keep => {}
        }
    }

    /// Submit a fetch of `kind` for `key` if its slot asks for one.
    ///
    /// Saturation leaves the slot untouched so the next pass tries again.
    fn submit_if_due(&mut self, key: TileKey, kind: FetchKind, stats: &mut UpdateStats) -> bool {
        let (frame, limit) = (self.frame, self.config.fetch_retry_limit);
        let Some(tile) = self.tiles.get_mut(key) else {
            return false;
        };
        if !tile.slot(kind).wants_fetch(frame, limit) {
            return false;
        }

        let job = match kind {
            FetchKind::Elevation => TileJob::Elevation {
                source: Arc::clone(&self.elevation),
                request: ElevationRequest::new(tile.bounds, self.tile_size, self.max_octaves),
                mesh: self.mesh_params,
            },
            FetchKind::Imagery => {
                let Some(source) = &self.imagery else {
                    return false;
                };
                TileJob::Imagery {
                    source: Arc::clone(source),
                    request: ImageryRequest {
                        bounds: tile.bounds,
                        size: self.tile_imagery_size,
                    },
                }
            }
        };

        match self.client.submit(job) {
            Ok(ticket) => {
                self.pending.insert(ticket.id(), (key, kind));
                tile.slot_mut(kind).begin(ticket);
                stats.fetches_submitted += 1;
                true
            }
            Err(SchedulerError::Saturated { in_flight, limit }) => {
                tracing::trace!("Scheduler saturated ({}/{}), fetch deferred", in_flight, limit);
                false
            }
            Err(err) => {
                tracing::warn!("Could not submit {:?} fetch: {}", kind, err);
                false
            }
        }
    }

    fn split(&mut self, key: TileKey, stats: &mut UpdateStats) {
        let display = self.display_range();
        let Some(tile) = self.tiles.get(key) else {
            return;
        };
        let quadrants = tile.bounds.split_into_four();
        let (level, visible, sse) = (tile.level + 1, tile.visible, tile.sse);

        let tiles = &mut self.tiles;
        let children = quadrants.map(|bounds| {
            let mut child = PlanetTile::new(bounds, level, Some(key), display);
            child.visible = visible;
            tiles.insert(child)
        });
        if let Some(tile) = self.tiles.get_mut(key) {
            tile.children = Some(children);
        }
        for child in children {
            self.submit_if_due(child, FetchKind::Elevation, stats);
        }
        stats.splits += 1;
        tracing::debug!("Split level {} tile (sse {:.1})", level - 1, sse);
    }

    /// Dispose every descendant of `key`.
    fn merge(&mut self, key: TileKey) {
        let Some(children) = self.tiles.get_mut(key).and_then(|t| t.children.take()) else {
            return;
        };
        for child in children {
            self.dispose_subtree(child);
        }
    }

    /// Remove `root` and its descendants, cancelling their fetches.
    fn dispose_subtree(&mut self, root: TileKey) {
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let Some(mut tile) = self.tiles.remove(key) else {
                continue;
            };
            if let Some(children) = tile.children.take() {
                stack.extend(children);
            }
            for kind in KINDS {
                if let Some(ticket) = tile.slot_mut(kind).abandon(false) {
                    self.client.cancel(&ticket);
                    self.pending.remove(&ticket.id());
                }
            }
        }
    }

    fn apply_result(&mut self, result: FetchResult, stats: &mut UpdateStats) {
        let FetchResult {
            request_id,
            kind,
            outcome,
            elapsed,
        } = result;

        let Some((key, expected)) = self.pending.remove(&request_id) else {
            tracing::trace!("Discarding result {}: no tile is waiting for it", request_id);
            stats.stale_results += 1;
            return;
        };
        let (frame, exaggeration, source_range) = (self.frame, self.exaggeration, self.source_range);
        let (backoff, limit) = (self.config.retry_backoff_frames, self.config.fetch_retry_limit);

        let Some(tile) = self.tiles.get_mut(key) else {
            tracing::trace!("Discarding result {}: tile was disposed", request_id);
            stats.stale_results += 1;
            return;
        };
        if kind != expected || !tile.slot(kind).is_waiting_for(request_id) {
            tracing::trace!("Discarding result {}: superseded", request_id);
            stats.stale_results += 1;
            return;
        }

        match outcome {
            Ok(JobOutput::Elevation(mesh)) => {
                if mesh.sanitized > 0 {
                    tracing::warn!(
                        "Clamped {} invalid elevation samples on a level {} tile",
                        mesh.sanitized,
                        tile.level
                    );
                }
                tile.mesh = Some(mesh);
                tile.ellipsoid_fallback = false;
                tile.elevation.complete();
                tile.refit_sphere(source_range, exaggeration);
                stats.results_applied += 1;
                tracing::trace!("Elevation {} applied after {:?}", request_id, elapsed);
            }
            Ok(JobOutput::Imagery(texture)) => {
                tile.texture = Some(texture);
                tile.imagery.complete();
                stats.results_applied += 1;
                tracing::trace!("Imagery {} applied after {:?}", request_id, elapsed);
            }
            Err(err) => {
                stats.fetch_failures += 1;
                let level = tile.level;
                let failure = tile.slot_mut(kind).fail(frame, backoff, limit);
                match failure {
                    FailureOutcome::RetryAt { frame: retry } => tracing::warn!(
                        "{:?} fetch for a level {} tile failed, retrying at frame {}: {}",
                        kind,
                        level,
                        retry,
                        err
                    ),
                    FailureOutcome::Exhausted => {
                        tracing::warn!(
                            "{:?} fetch for a level {} tile failed {} times, giving up: {}",
                            kind,
                            level,
                            limit,
                            err
                        );
                        if kind == FetchKind::Elevation {
                            self.give_up_elevation(key, stats);
                        }
                    }
                }
            }
        }
    }

    /// A tile can never get elevation: show its parent instead, or the bare
    /// ellipsoid for a root.
    fn give_up_elevation(&mut self, key: TileKey, stats: &mut UpdateStats) {
        let Some(tile) = self.tiles.get(key) else {
            return;
        };
        match tile.parent {
            Some(parent) => {
                self.merge(parent);
                stats.merges += 1;
                if let Some(parent) = self.tiles.get_mut(parent) {
                    parent.refinement_blocked = true;
                }
            }
            None => self.fall_back_to_ellipsoid(key),
        }
    }

    fn fall_back_to_ellipsoid(&mut self, key: TileKey) {
        let (source_range, exaggeration) = (self.source_range, self.exaggeration);
        let Some(tile) = self.tiles.get_mut(key) else {
            return;
        };
        tile.refinement_blocked = true;
        if tile.mesh.is_some() {
            // keep the terrain fetched from an earlier source
            tile.elevation.complete();
            return;
        }
        let request = ElevationRequest::new(tile.bounds, self.tile_size, self.max_octaves);
        match build_ellipsoid_mesh(&request, &self.mesh_params) {
            Ok(mesh) => {
                tile.mesh = Some(mesh);
                tile.ellipsoid_fallback = true;
                tile.elevation.complete();
                tile.refit_sphere(source_range, exaggeration);
                tracing::warn!("Root tile has no elevation data, showing the bare ellipsoid");
            }
            Err(err) => tracing::error!("Could not build fallback ellipsoid mesh: {}", err),
        }
    }

    /// Terrain elevation at a longitude/latitude in radians, scaled by the
    /// current exaggeration.
    ///
    /// Samples the deepest tile on the path from the containing root whose
    /// elevation is loaded. Returns 0 when nothing is loaded there yet.
    pub fn get_terrain_elevation(&self, lon: f64, lat: f64) -> f64 {
        self.deepest_grid(lon, lat)
            .map_or(0.0, |(grid, lon, lat)| grid.sample(lon, lat) * self.exaggeration)
    }

    fn deepest_grid(&self, lon: f64, lat: f64) -> Option<(&ElevationGrid, f64, f64)> {
        let (lon, lat) = normalize_position(lon, lat)?;
        let mut key = self.root_containing(lon, lat)?;
        let mut grid = None;
        while let Some(tile) = self.tiles.get(key) {
            match &tile.mesh {
                Some(mesh) => grid = Some(&mesh.grid),
                None => break,
            }
            let Some(children) = &tile.children else {
                break;
            };
            key = children[tile.bounds.quadrant_of(lon, lat).index()];
        }
        grid.map(|g| (g, lon, lat))
    }

    fn root_containing(&self, lon: f64, lat: f64) -> Option<TileKey> {
        self.roots.iter().copied().find(|&root| {
            self.tiles
                .get(root)
                .is_some_and(|t| t.bounds.contains_point(lon, lat))
        })
    }

    /// Deepest tile containing the point, whatever its load state.
    pub fn leaf_at(&self, lon: f64, lat: f64) -> Option<TileKey> {
        let (lon, lat) = normalize_position(lon, lat)?;
        let mut key = self.root_containing(lon, lat)?;
        while let Some(children) = self.tiles.get(key).and_then(|t| t.children.as_ref()) {
            let bounds = self.tiles.get(key)?.bounds;
            key = children[bounds.quadrant_of(lon, lat).index()];
        }
        Some(key)
    }

    /// Leaf tiles whose bounds intersect `bounds`.
    pub fn interacts_with(&self, bounds: &TileBounds) -> Vec<TileKey> {
        let mut leaves = Vec::new();
        let mut stack: Vec<TileKey> = self.roots.to_vec();
        while let Some(key) = stack.pop() {
            let Some(tile) = self.tiles.get(key) else {
                continue;
            };
            if !tile.bounds.intersects(bounds) {
                continue;
            }
            match &tile.children {
                Some(children) => stack.extend(children.iter().copied()),
                None => leaves.push(key),
            }
        }
        leaves
    }

    /// Tiles to draw: visible tiles whose children are not all loaded yet,
    /// so a parent keeps rendering until its four children can replace it.
    pub fn render_list(&self) -> Vec<RenderTile<'_>> {
        let mut out = Vec::new();
        let mut stack: Vec<TileKey> = self.roots.to_vec();
        while let Some(key) = stack.pop() {
            let Some(tile) = self.tiles.get(key) else {
                continue;
            };
            if !tile.visible {
                continue;
            }
            if let Some(children) = &tile.children {
                let loaded = children
                    .iter()
                    .all(|c| self.tiles.get(*c).is_some_and(|t| t.mesh.is_some()));
                if loaded {
                    stack.extend(children.iter().copied());
                    continue;
                }
            }
            if let Some(mesh) = &tile.mesh {
                out.push(RenderTile {
                    key,
                    level: tile.level,
                    bounds: tile.bounds,
                    mesh,
                    imagery: self.imagery_binding(key),
                    exaggeration: self.exaggeration,
                });
            }
        }
        out
    }

    /// Texture for `key`: its own, the nearest ancestor's sub-rectangle, or
    /// the base colour.
    pub fn imagery_binding(&self, key: TileKey) -> ImageryBinding<'_> {
        let base = ImageryBinding::BaseColor(self.current_base_color());
        let Some(tile) = self.tiles.get(key) else {
            return base;
        };
        if let Some(texture) = &tile.texture {
            return ImageryBinding::Own(texture);
        }

        let mut cursor = tile.parent;
        while let Some(ancestor) = cursor.and_then(|k| self.tiles.get(k)) {
            if let Some(texture) = &ancestor.texture {
                let (u, v) = ancestor
                    .bounds
                    .uv_of(tile.bounds.min_lon(), tile.bounds.min_lat());
                return ImageryBinding::Ancestor {
                    texture,
                    level: ancestor.level,
                    uv_offset: [u as f32, v as f32],
                    uv_scale: [
                        (tile.bounds.width() / ancestor.bounds.width()) as f32,
                        (tile.bounds.height() / ancestor.bounds.height()) as f32,
                    ],
                };
            }
            cursor = ancestor.parent;
        }
        base
    }

    fn current_base_color(&self) -> [u8; 4] {
        self.imagery
            .as_ref()
            .map_or(self.base_color, |source| source.base_color())
    }

    /// Change the vertical scale of displayed and queried elevations.
    ///
    /// Meshes keep raw heights, so nothing is re-fetched; bounding spheres are
    /// refitted to the new scale.
    pub fn set_elevation_exaggeration(&mut self, exaggeration: f64) -> Result<(), PlanetError> {
        if !exaggeration.is_finite() || exaggeration < 0.0 {
            return Err(invalid(
                "planet.elevation_exaggeration",
                format!("must be finite and >= 0, got {exaggeration}"),
            ));
        }
        self.exaggeration = exaggeration;
        let range = self.source_range;
        for (_, tile) in self.tiles.iter_mut() {
            tile.refit_sphere(range, exaggeration);
        }
        Ok(())
    }

    pub fn elevation_exaggeration(&self) -> f64 {
        self.exaggeration
    }

    /// Replace the elevation source. Outstanding elevation fetches are
    /// cancelled and every tile re-fetches while keeping its current mesh.
    pub fn set_elevation_source(
        &mut self,
        source: Arc<dyn ElevationSource>,
    ) -> Result<(), PlanetError> {
        let range = checked_range(source.as_ref())?;
        self.cancel_all(FetchKind::Elevation);
        self.elevation = source;
        self.source_range = range;
        self.policy = LodPolicy::from_config(&self.config, self.elevation.max_level());
        let exaggeration = self.exaggeration;
        for (_, tile) in self.tiles.iter_mut() {
            tile.refinement_blocked = false;
            tile.elevation.clear_failures();
            tile.elevation.mark_stale();
            tile.refit_sphere(range, exaggeration);
        }
        tracing::info!("Elevation source replaced, range [{}, {}]", range.0, range.1);
        Ok(())
    }

    /// Replace or remove the imagery source. With `None` every tile falls
    /// back to the base colour.
    pub fn set_imagery_source(&mut self, source: Option<Arc<dyn ImagerySource>>) {
        self.cancel_all(FetchKind::Imagery);
        let enabled = source.is_some();
        self.imagery = source;
        for (_, tile) in self.tiles.iter_mut() {
            tile.imagery.clear_failures();
            if enabled {
                tile.imagery.mark_stale();
            } else {
                tile.texture = None;
                tile.imagery = Default::default();
            }
        }
    }

    fn cancel_all(&mut self, kind: FetchKind) {
        for (_, tile) in self.tiles.iter_mut() {
            let has_data = match kind {
                FetchKind::Elevation => tile.mesh.is_some(),
                FetchKind::Imagery => tile.texture.is_some(),
            };
            if let Some(ticket) = tile.slot_mut(kind).abandon(has_data) {
                self.client.cancel(&ticket);
                self.pending.remove(&ticket.id());
            }
        }
    }

    /// Skip all update work until [`resume_rendering`](Self::resume_rendering).
    pub fn pause_rendering(&mut self) {
        self.paused = true;
    }

    pub fn resume_rendering(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Forget permanent fetch failures so blocked tiles refine again.
    pub fn clear_failures(&mut self) {
        for (_, tile) in self.tiles.iter_mut() {
            tile.refinement_blocked = false;
            tile.elevation.clear_failures();
            tile.imagery.clear_failures();
            if tile.ellipsoid_fallback {
                tile.elevation.mark_stale();
            }
        }
    }

    /// Height of `position` above the loaded terrain.
    pub fn distance_to_ground(&self, position: DVec3) -> f64 {
        let geo = inverse(position);
        geo.height - self.get_terrain_elevation(geo.lon, geo.lat)
    }

    /// Lift `camera` along the vertical until it is at least `min_clearance`
    /// meters above the terrain. Returns `true` if it moved.
    pub fn clamp_camera_height(&self, camera: &mut Camera, min_clearance: f64) -> bool {
        let geo = camera.geodetic();
        let ground = self.get_terrain_elevation(geo.lon, geo.lat);
        if geo.height - ground >= min_clearance {
            return false;
        }
        camera.position = forward(geo.lon, geo.lat, ground + min_clearance);
        true
    }

    pub fn stats(&self) -> PlanetStats {
        let mut stats = PlanetStats {
            pending_fetches: self.pending.len(),
            ..Default::default()
        };
        for (_, tile) in self.tiles.iter() {
            stats.tiles += 1;
            if tile.children.is_none() {
                stats.leaves += 1;
            }
            if tile.visible {
                stats.visible += 1;
            }
            match tile.elevation.state() {
                LoadState::Loading => stats.loading += 1,
                LoadState::Ready => stats.ready += 1,
                LoadState::Error => stats.errored += 1,
                LoadState::Empty => {}
            }
            stats.deepest_level = stats.deepest_level.max(tile.level);
            stats.mesh_bytes += tile.mesh.as_ref().map_or(0, TileMesh::byte_size);
            stats.texture_bytes += tile.texture.as_ref().map_or(0, ImageryTexture::byte_size);
        }
        stats
    }

    /// The western and eastern hemisphere roots.
    pub fn roots(&self) -> [TileKey; 2] {
        self.roots
    }

    pub fn tile(&self, key: TileKey) -> Option<&PlanetTile> {
        self.tiles.get(key)
    }

    pub fn tiles(&self) -> impl Iterator<Item = (TileKey, &PlanetTile)> {
        self.tiles.iter()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Camera passed to the latest update (or the builder).
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn config(&self) -> &PlanetConfig {
        &self.config
    }

    pub fn lod_policy(&self) -> &LodPolicy {
        &self.policy
    }

    /// Number of updates that ran (paused calls excluded).
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn scheduler(&self) -> &Arc<TileLoadScheduler> {
        self.client.scheduler()
    }

    fn display_range(&self) -> (f64, f64) {
        scale_range(self.source_range, self.exaggeration)
    }
}

impl Drop for Planet {
    fn drop(&mut self) {
        let mut cancelled = 0;
        for (_, tile) in self.tiles.iter_mut() {
            for kind in KINDS {
                if let Some(ticket) = tile.slot_mut(kind).abandon(false) {
                    self.client.cancel(&ticket);
                    cancelled += 1;
                }
            }
        }
        self.pending.clear();
        tracing::debug!("Planet dropped, {} outstanding fetches cancelled", cancelled);
    }
}

/// Wrap longitude into `[-π, π]` and clamp latitude; `None` for non-finite input.
fn normalize_position(lon: f64, lat: f64) -> Option<(f64, f64)> {
    if !(lon.is_finite() && lat.is_finite()) {
        return None;
    }
    let lon = if (-PI..=PI).contains(&lon) {
        lon
    } else {
        (lon + PI).rem_euclid(TAU) - PI
    };
    Some((lon, lat.clamp(-FRAC_PI_2, FRAC_PI_2)))
}
