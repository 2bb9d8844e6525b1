//! The per-frame streaming loop.
//!
//! `Streamer` owns every structure involved in keeping the world around the
//! observer loaded, lit and meshed. All structural mutation happens inside
//! `update` (or the edit methods) on the calling thread; mesh generation is
//! the only work done elsewhere.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use tessel_blocks::{LIGHT_MAX, MaterialTable, Voxel};
use tessel_chunk::{
    Acquired, Chunk, ChunkArena, ChunkDirectory, Emitter, Placeholders, Population, RenderState, ReuseQuery, VoxelGrid,
};
use tessel_geom::{Frustum, Vec3};
use tessel_lighting::{LightEngine, LightInput, LightNeighbor, NeighborAction};
use tessel_mesh_cpu::Neighborhood;
use tessel_world::{ChunkCoord, ChunkId, ColumnSample, DetailGenerator, Face, HeightQuery, TerrainFill};

use crate::column_cache::{ColumnCache, ColumnCacheStats};
use crate::config::StreamConfig;
use crate::deferred::{DeferredHandle, DeferredQueue};
use crate::error::{Stage, StreamError};
use crate::hooks::{ChunkEvents, Diagnostic, MeshSink, MeshUpload, NoEvents, NullMeshSink};
use crate::octree::VisibilityOctree;
use crate::pipeline::{MeshJob, MeshPipeline, MeshResult, SubmitError};
use crate::query::{self, RayHit, VoxelHit};
use crate::render_queue::{EnqueueOutcome, PopQuery, QueueFlags, RenderQueue};

/// Where the observer is this frame. The frustum is ignored when culling is
/// disabled in the configuration.
#[derive(Clone, Copy, Debug)]
pub struct Observer {
    pub position: Vec3,
    pub frustum: Option<Frustum>,
}

impl Observer {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            frustum: None,
        }
    }
}

/// External capabilities handed to the streamer.
pub struct Collaborators {
    pub terrain: Arc<dyn TerrainFill>,
    pub heights: Arc<dyn HeightQuery>,
    pub details: Vec<Arc<dyn DetailGenerator>>,
    pub events: Box<dyn ChunkEvents>,
    pub sink: Box<dyn MeshSink>,
}

impl Collaborators {
    /// Terrain that also answers height queries; no details, events or sink.
    pub fn new<T: TerrainFill + HeightQuery + 'static>(terrain: Arc<T>) -> Self {
        Self {
            terrain: terrain.clone(),
            heights: terrain,
            details: Vec::new(),
            events: Box::new(NoEvents),
            sink: Box::new(NullMeshSink),
        }
    }

    pub fn with_detail(mut self, d: Arc<dyn DetailGenerator>) -> Self {
        self.details.push(d);
        self
    }

    pub fn with_events(mut self, events: impl ChunkEvents + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn with_sink(mut self, sink: impl MeshSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameReport {
    pub frame: u64,
    pub created: usize,
    pub reused: usize,
    pub lit: usize,
    pub submitted: usize,
    pub uploaded: usize,
    /// Results dropped because their chunk was reassigned meanwhile.
    pub stale_results: usize,
    pub unloaded: usize,
    pub queue_len: usize,
    pub in_flight: usize,
    pub pending_submit: usize,
    pub live_chunks: usize,
    pub explore_idle: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub aborted: Option<(Stage, String)>,
    pub elapsed: Duration,
}

impl FrameReport {
    /// Nothing left to discover, light or mesh.
    pub fn is_settled(&self) -> bool {
        self.explore_idle && self.queue_len == 0 && self.in_flight == 0 && self.pending_submit == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingMesh {
    chunk: ChunkId,
    generation: u32,
}

struct Generated {
    grid: Option<VoxelGrid>,
    above_surface: bool,
}

/// Face neighbour data copied out of the arena for one lighting pass.
enum Held {
    Grid(Arc<VoxelGrid>, Vec<Emitter>),
    Uniform(u8),
    Missing,
}

pub struct Streamer {
    cfg: StreamConfig,
    materials: Arc<MaterialTable>,
    arena: ChunkArena,
    directory: ChunkDirectory,
    octree: VisibilityOctree,
    queue: RenderQueue,
    pipeline: MeshPipeline,
    light: LightEngine,
    placeholders: Placeholders,
    terrain: Arc<dyn TerrainFill>,
    heights: Arc<dyn HeightQuery>,
    details: Vec<Arc<dyn DetailGenerator>>,
    events: Box<dyn ChunkEvents>,
    sink: Box<dyn MeshSink>,
    columns: ColumnCache,
    deferred: DeferredQueue,
    observer: ChunkCoord,
    last_observer: Option<ChunkCoord>,
    frustum: Option<Frustum>,
    frustum_epoch: u64,
    recenter_pending: bool,
    pending: Vec<PendingMesh>,
    unload_cursor: usize,
    stage: Stage,
    diagnostic_counts: [u64; Diagnostic::COUNT],
    frame: u64,
    report: FrameReport,
}

impl Streamer {
    pub fn new(cfg: StreamConfig, materials: Arc<MaterialTable>, collab: Collaborators) -> Result<Self, StreamError> {
        let pipeline = MeshPipeline::new(cfg.meshing.worker_count(), cfg.meshing.ring_size, Arc::clone(&materials))?;
        let solid = materials
            .materials
            .iter()
            .find(|m| m.category.occludes())
            .map(Voxel::from_material)
            .unwrap_or(Voxel::AIR);
        let Collaborators {
            terrain,
            heights,
            details,
            events,
            sink,
        } = collab;
        Ok(Self {
            arena: ChunkArena::new(cfg.arena_config()),
            directory: ChunkDirectory::new(),
            octree: VisibilityOctree::new(cfg.view.distance_xz, cfg.view.distance_y, cfg.queue.octree_stack_capacity),
            queue: RenderQueue::new(cfg.queue.render_capacity),
            pipeline,
            light: LightEngine::new(cfg.light_config()),
            placeholders: Placeholders::new(solid),
            terrain,
            heights,
            details,
            events,
            sink,
            columns: ColumnCache::new(cfg.world.column_cache),
            deferred: DeferredQueue::new(),
            observer: ChunkCoord::default(),
            last_observer: None,
            frustum: None,
            frustum_epoch: 1,
            recenter_pending: false,
            pending: Vec::new(),
            unload_cursor: 0,
            stage: Stage::Idle,
            diagnostic_counts: [0; Diagnostic::COUNT],
            frame: 0,
            report: FrameReport::default(),
            materials,
            cfg,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.cfg
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn arena(&self) -> &ChunkArena {
        &self.arena
    }

    pub fn directory(&self) -> &ChunkDirectory {
        &self.directory
    }

    pub fn octree(&self) -> &VisibilityOctree {
        &self.octree
    }

    pub fn observer(&self) -> ChunkCoord {
        self.observer
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn chunk_at(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.directory.lookup(coord).map(|id| self.arena.get(id))
    }

    pub fn deferred(&self) -> DeferredHandle {
        self.deferred.handle()
    }

    /// Times `d` has been raised since construction.
    pub fn diagnostic_count(&self, d: Diagnostic) -> u64 {
        self.diagnostic_counts[d.index()]
    }

    pub fn column_stats(&self) -> ColumnCacheStats {
        self.columns.stats()
    }

    /// Height/biome sample for a world column, cached.
    pub fn column(&self, x: i32, z: i32) -> ColumnSample {
        self.columns.sample(self.heights.as_ref(), x, z)
    }

    pub fn voxel_at(&self, wx: i32, wy: i32, wz: i32) -> Option<VoxelHit> {
        query::voxel_at(&self.directory, &self.arena, wx, wy, wz)
    }

    /// First loaded voxel with content along the ray.
    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_dist: f32) -> Option<(RayHit, VoxelHit)> {
        let hit = query::raycast(origin, dir, max_dist, |x, y, z| {
            self.voxel_at(x, y, z).is_some_and(|h| h.voxel.has_content())
        })?;
        let [x, y, z] = hit.block;
        Some((hit, self.voxel_at(x, y, z)?))
    }

    /// Runs one frame. Never panics: a panic inside any stage abandons the
    /// rest of the frame and is reported in `FrameReport::aborted`.
    pub fn update(&mut self, observer: &Observer) -> FrameReport {
        let t0 = Instant::now();
        self.frame += 1;
        self.report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_frame(observer)));
        if let Err(payload) = outcome {
            let err = StreamError::Panicked {
                stage: self.stage,
                message: panic_message(payload.as_ref()),
            };
            error!("frame {} abandoned: {err}", self.frame);
            self.report.aborted = Some((self.stage, err.to_string()));
        }
        self.stage = Stage::Idle;
        let mut report = std::mem::take(&mut self.report);
        report.queue_len = self.queue.len();
        report.in_flight = self.pipeline.in_flight();
        report.pending_submit = self.pending.len();
        report.live_chunks = self.arena.live();
        report.explore_idle = self.octree.is_idle();
        report.elapsed = t0.elapsed();
        report
    }

    fn run_frame(&mut self, observer: &Observer) {
        self.stage = Stage::Deferred;
        for job in self.deferred.take_batch() {
            job(self);
        }

        self.stage = Stage::Observer;
        let jumped = self.observe(observer);

        if jumped {
            self.stage = Stage::NearScan;
            self.near_scan();
        }

        self.stage = Stage::Explore;
        self.explore();

        self.stage = Stage::Upload;
        self.upload();

        self.stage = Stage::Lighting;
        self.drain_render_queue();

        self.stage = Stage::Submit;
        self.submit_pending();

        self.stage = Stage::Unload;
        self.unload_scan();
    }

    /// Tracks the observer cell and frustum. Returns true after a jump of
    /// more than one chunk on any axis (or on the first frame).
    fn observe(&mut self, o: &Observer) -> bool {
        let p = o.position;
        let coord = ChunkCoord::from_point(p.x, p.y, p.z);
        let jumped = match self.last_observer {
            None => true,
            Some(prev) => {
                (coord.cx - prev.cx).abs() > 1 || (coord.cy - prev.cy).abs() > 1 || (coord.cz - prev.cz).abs() > 1
            }
        };
        let moved = self.last_observer != Some(coord);
        self.observer = coord;
        self.last_observer = Some(coord);

        let frustum = if self.cfg.view.frustum_culling { o.frustum } else { None };
        let frustum_changed = frustum != self.frustum;
        if frustum_changed {
            self.frustum = frustum;
            self.frustum_epoch += 1;
        }

        if moved || self.recenter_pending {
            self.recenter_pending = false;
            for c in self.octree.recenter(coord) {
                self.directory.clear_leaf(c);
            }
        } else if frustum_changed {
            self.octree.rebuild_stack();
        }
        jumped
    }

    #[inline]
    fn in_view(&self, c: ChunkCoord) -> bool {
        self.observer.within_view(c, self.cfg.view.distance_xz, self.cfg.view.distance_y)
    }

    fn diagnostic(&mut self, d: Diagnostic) {
        let n = &mut self.diagnostic_counts[d.index()];
        *n += 1;
        if *n == 1 {
            warn!("{}", d.message());
        } else {
            debug!("{} (x{})", d.message(), n);
        }
        self.events.diagnostic(d);
        self.report.diagnostics.push(d);
    }

    fn enqueue(&mut self, id: ChunkId, flags: QueueFlags) {
        let chunk = self.arena.get_mut(id);
        if !chunk.is_populated() {
            return;
        }
        if self.queue.enqueue(chunk, flags) == EnqueueOutcome::Exhausted {
            self.diagnostic(Diagnostic::RenderQueueExhausted);
        }
    }

    /// Full scan of the small cube around the observer; nothing near it may
    /// be skipped after a jump.
    fn near_scan(&mut self) {
        let r = self.cfg.view.force_radius.max(0);
        for dy in -r..=r {
            for dz in -r..=r {
                for dx in -r..=r {
                    let c = self.observer.offset(dx, dy, dz);
                    match self.directory.lookup(c) {
                        Some(id) => self.revisit(id),
                        None => match self.create_chunk(c) {
                            Ok(_) | Err(StreamError::OutsideWorld { .. }) => {}
                            Err(_) => return,
                        },
                    }
                }
            }
        }
    }

    fn explore(&mut self) {
        let deadline = Instant::now() + self.cfg.budget.explore();
        let cap = self.cfg.budget.max_creations_per_frame.max(1);
        let mut created = 0;
        while created < cap && Instant::now() < deadline {
            let frustum = self.frustum;
            let Some(cand) = self.octree.next_candidate(frustum.as_ref()) else {
                break;
            };
            self.directory.set_leaf(cand.coord, cand.leaf);
            match self.directory.lookup(cand.coord) {
                Some(id) => self.revisit(id),
                None => match self.create_chunk(cand.coord) {
                    Ok(_) => created += 1,
                    // The leaf stays explored so the scan moves past the key envelope.
                    Err(StreamError::OutsideWorld { .. }) => {}
                    Err(e) => {
                        debug!("explore paused: {e}");
                        self.directory.clear_leaf(cand.coord);
                        self.octree.invalidate(cand.leaf, cand.coord);
                        break;
                    }
                },
            }
        }
        if self.octree.take_dropped() > 0 {
            self.diagnostic(Diagnostic::OctreeStackFull);
        }
    }

    /// A known chunk was found again by a visibility scan.
    fn revisit(&mut self, id: ChunkId) {
        let in_view = self.in_view(self.arena.get(id).coord);
        let chunk = self.arena.get_mut(id);
        if in_view && !chunk.visible {
            chunk.visible = true;
            self.events.visibility_changed(chunk, true);
        }
        let stale = chunk.needs_mesh_rebuild || !chunk.has_mesh;
        if chunk.is_populated() && stale && !chunk.in_queue && chunk.render != RenderState::RenderingRequested {
            let flags = if chunk.has_mesh { QueueFlags::MESH } else { QueueFlags::REFRESH };
            self.enqueue(id, flags);
        }
    }

    /// The chunk at `coord`, generating it (and possibly reusing a far
    /// record) if it is not loaded.
    pub fn lookup_or_create(&mut self, coord: ChunkCoord) -> Result<ChunkId, StreamError> {
        match self.directory.lookup(coord) {
            Some(id) => Ok(id),
            None => self.create_chunk(coord),
        }
    }

    fn create_chunk(&mut self, coord: ChunkCoord) -> Result<ChunkId, StreamError> {
        if let Some(id) = self.directory.lookup(coord) {
            return Ok(id);
        }
        if coord.key().is_none() {
            return Err(StreamError::OutsideWorld { coord });
        }
        let query = ReuseQuery {
            target: coord,
            observer: self.observer,
            view_xz: self.cfg.view.distance_xz,
            view_y: self.cfg.view.distance_y,
        };
        let events = &mut self.events;
        if !self.arena.can_acquire(&query, |c| events.allow_reuse(c)) {
            self.diagnostic(Diagnostic::ArenaExhausted);
            return Err(StreamError::ArenaExhausted { coord });
        }
        self.events.before_create(coord);
        // Generate before taking a record so a failing generator leaves the
        // arena untouched.
        let generated = self.generate(coord);
        let events = &mut self.events;
        let acquired = self.arena.acquire(&query, |c| events.allow_reuse(c));
        let id = match acquired {
            Acquired::Fresh(id) => id,
            Acquired::Reused { id, previous, fallback } => {
                if fallback {
                    self.diagnostic(Diagnostic::ReuseBufferTooSmall);
                }
                self.events.reused(self.arena.get(id), previous);
                self.detach(id);
                self.report.reused += 1;
                id
            }
            Acquired::Exhausted => {
                self.diagnostic(Diagnostic::ArenaExhausted);
                return Err(StreamError::ArenaExhausted { coord });
            }
        };
        self.populate(id, coord, generated);
        Ok(id)
    }

    /// Terrain and details for `coord`. Chunks outside the configured
    /// bounds are empty open sky.
    fn generate(&self, coord: ChunkCoord) -> Generated {
        if self.cfg.world.bounds.is_some_and(|b| !b.contains(coord)) {
            return Generated {
                grid: None,
                above_surface: true,
            };
        }
        let mut grid = VoxelGrid::air();
        let fill = self.terrain.fill(coord, grid.as_mut_slice());
        if !fill.has_content {
            return Generated {
                grid: None,
                above_surface: fill.above_surface,
            };
        }
        for d in &self.details {
            d.decorate(coord, grid.as_mut_slice());
        }
        grid.clear_light();
        Generated {
            grid: Some(grid),
            above_surface: fill.above_surface,
        }
    }

    fn populate(&mut self, id: ChunkId, coord: ChunkCoord, generated: Generated) {
        let visible = self.in_view(coord);
        let chunk = self.arena.assign(id, coord);
        chunk.above_surface = generated.above_surface;
        if let Some(grid) = generated.grid {
            for (i, v) in grid.as_slice().iter().enumerate() {
                let e = self.materials.emission(v.material());
                if e > 0 {
                    chunk.set_emitter(i as u16, e);
                }
            }
            chunk.voxel_signature = grid.content_signature();
            chunk.voxels = Some(Arc::new(grid));
            chunk.population = Population::Populated;
        }
        chunk.visible = visible;
        let populated = chunk.is_populated();
        self.directory.insert(coord, id, &mut self.arena);
        self.report.created += 1;

        let chunk = self.arena.get(id);
        self.events.after_create(chunk);
        if visible {
            self.events.visibility_changed(chunk, true);
        }
        if populated && visible {
            self.enqueue(id, QueueFlags::REFRESH);
        }
        // Neighbours built against a stand-in for this chunk need another pass.
        let neighbors = self.arena.get(id).neighbors;
        for face in Face::ALL {
            let Some(nid) = neighbors[face.index()] else {
                continue;
            };
            let n = self.arena.get_mut(nid);
            let bit = face.opposite().bit();
            if n.inconclusive & bit != 0 {
                n.inconclusive &= !bit;
                self.enqueue(nid, QueueFlags::REFRESH);
            }
        }
    }

    /// Unhooks a live chunk from every structure that refers to it. The
    /// record itself is left to the caller to release or reassign.
    fn detach(&mut self, id: ChunkId) {
        let chunk = self.arena.get_mut(id);
        let coord = chunk.coord;
        let was_populated = chunk.is_populated();
        self.queue.remove(chunk);
        if chunk.visible {
            chunk.visible = false;
            self.events.visibility_changed(chunk, false);
        }
        if chunk.has_mesh {
            chunk.has_mesh = false;
            self.sink.release(id, coord);
        }
        chunk.clear_light();
        self.pending.retain(|p| p.chunk != id);
        self.directory.forget_chunk(id);
        if let Some(entry) = self.directory.remove(coord, &mut self.arena) {
            if let Some(leaf) = entry.leaf {
                self.octree.invalidate(leaf, coord);
            }
        }
        self.recenter_pending = true;
        if was_populated {
            self.invalidate_light_around(coord, false);
        }
    }

    /// Zeroes light around `coord` before anything is relit so stale light
    /// cannot be seeded back from a neighbour. Covers the 3x3x3 ring and the
    /// 3x3 columns below it down to the vertical view limit. Ring chunks are
    /// always requeued when `requeue_ring`; everything else only when in view.
    fn invalidate_light_around(&mut self, coord: ChunkCoord, requeue_ring: bool) {
        let floor = self.observer.cy - self.cfg.view.distance_y;
        let mut targets = Vec::with_capacity(27);
        for dy in -1..=1 {
            for dz in -1..=1 {
                for dx in -1..=1 {
                    targets.push((coord.offset(dx, dy, dz), requeue_ring));
                }
            }
        }
        for dz in -1..=1 {
            for dx in -1..=1 {
                let mut cy = coord.cy - 2;
                while cy >= floor {
                    targets.push((ChunkCoord::new(coord.cx + dx, cy, coord.cz + dz), false));
                    cy -= 1;
                }
            }
        }
        for (t, force) in targets {
            let Some(id) = self.directory.lookup(t) else {
                continue;
            };
            let requeue = force || self.in_view(t);
            let c = self.arena.get_mut(id);
            if !c.is_populated() {
                continue;
            }
            c.clear_light();
            c.request_mesh();
            if requeue {
                let flags = if force { QueueFlags::EDIT } else { QueueFlags::REFRESH };
                self.enqueue(id, flags);
            }
        }
    }

    fn drain_render_queue(&mut self) {
        let deadline = Instant::now() + self.cfg.budget.render_queue();
        let frustum = self.frustum;
        let qc = &self.cfg.queue;
        let q = PopQuery {
            observer: self.observer,
            frustum: frustum.as_ref(),
            frustum_epoch: self.frustum_epoch,
            accepted_dist_sq: qc.accepted_distance * qc.accepted_distance,
            force_dist_sq: qc.force_distance * qc.force_distance,
            early_exit_dist_sq: qc.early_exit_distance * qc.early_exit_distance,
            max_scan: qc.max_scan,
        };
        while Instant::now() < deadline {
            let Some((id, flags)) = self.queue.pop_nearest(&mut self.arena, &q) else {
                break;
            };
            self.relight(id, flags);
        }
    }

    /// Recomputes a chunk's light, schedules its mesh if anything changed,
    /// and passes follow-up work to its neighbours.
    fn relight(&mut self, id: ChunkId, flags: QueueFlags) {
        let chunk = self.arena.get(id);
        if !chunk.is_populated() {
            return;
        }
        let held: [Held; 6] = std::array::from_fn(|f| match chunk.neighbors[f] {
            Some(nid) => {
                let n = self.arena.get(nid);
                match (n.population, n.voxels.as_ref()) {
                    (Population::Populated, Some(g)) => Held::Grid(Arc::clone(g), n.emitters.clone()),
                    (Population::Unloaded, _) => Held::Missing,
                    _ => Held::Uniform(if n.above_surface { LIGHT_MAX } else { 0 }),
                }
            }
            None => Held::Missing,
        });
        let neighbors: [LightNeighbor<'_>; 6] = std::array::from_fn(|f| match &held[f] {
            Held::Grid(g, e) => LightNeighbor::Grid {
                grid: g.as_ref(),
                emitters: e.as_slice(),
            },
            Held::Uniform(sun) => LightNeighbor::Uniform { sun: *sun, torch: 0 },
            Held::Missing => LightNeighbor::Missing,
        });
        let emitters = chunk.emitters.clone();
        let input = LightInput {
            neighbors,
            emitters: &emitters,
            fresh: flags.clear_light,
            above_surface: chunk.above_surface,
        };

        let chunk = self.arena.get_mut(id);
        let Some(grid) = chunk.voxels_mut() else {
            return;
        };
        let report = self.light.compute(grid, &input);
        let changed = report.signature != chunk.light_signature;
        chunk.light_signature = report.signature;
        chunk.inconclusive = report.inconclusive;
        if changed || flags.needs_mesh {
            chunk.request_mesh();
        }
        if chunk.needs_mesh_rebuild && chunk.render != RenderState::RenderingRequested {
            chunk.render = RenderState::RenderingRequested;
            self.pending.push(PendingMesh {
                chunk: id,
                generation: chunk.generation,
            });
        }
        let links = chunk.neighbors;
        self.report.lit += 1;
        if report.overflowed {
            self.diagnostic(Diagnostic::LightQueueOverflow);
        }
        for face in Face::ALL {
            let Some(nid) = links[face.index()] else {
                continue;
            };
            match report.actions[face.index()] {
                NeighborAction::ForceMesh => self.enqueue(nid, QueueFlags::MESH),
                NeighborAction::LightOnly => self.enqueue(nid, QueueFlags::LIGHT),
                NeighborAction::None => {}
            }
        }
    }

    fn neighbor_grid(&self, coord: ChunkCoord, center_above: bool) -> Arc<VoxelGrid> {
        match self.directory.lookup(coord).map(|id| self.arena.get(id)) {
            Some(n) if n.is_live() => match n.voxels.as_ref() {
                Some(g) => Arc::clone(g),
                None => Arc::clone(self.placeholders.empty(n.above_surface)),
            },
            _ => Arc::clone(self.placeholders.missing(center_above)),
        }
    }

    fn build_job(&self, id: ChunkId) -> MeshJob {
        let c = self.arena.get(id);
        let center = c
            .voxels
            .clone()
            .unwrap_or_else(|| Arc::clone(self.placeholders.empty(c.above_surface)));
        let grids: [Arc<VoxelGrid>; 27] = std::array::from_fn(|slot| {
            let slot = slot as i32;
            let (dx, dz, dy) = (slot % 3 - 1, (slot / 3) % 3 - 1, slot / 9 - 1);
            if dx == 0 && dy == 0 && dz == 0 {
                Arc::clone(&center)
            } else {
                self.neighbor_grid(c.coord.offset(dx, dy, dz), c.above_surface)
            }
        });
        MeshJob {
            chunk: id,
            generation: c.generation,
            request: c.mesh_request,
            coord: c.coord,
            voxel_signature: c.voxel_signature,
            neighborhood: Neighborhood::new(grids),
        }
    }

    /// Hands pending chunks to the mesh workers. Chunks whose worker ring
    /// is full stay pending for the next frame.
    fn submit_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        let mut kept = Vec::with_capacity(pending.len());
        let mut full = false;
        for p in pending {
            let c = self.arena.get(p.chunk);
            if c.generation != p.generation || !c.is_populated() {
                continue;
            }
            if !self.pipeline.has_room(p.chunk) {
                full = true;
                kept.push(p);
                continue;
            }
            match self.pipeline.submit(self.build_job(p.chunk)) {
                Ok(()) => self.report.submitted += 1,
                Err(SubmitError::Full) => {
                    full = true;
                    kept.push(p);
                }
                Err(SubmitError::ShutDown) => kept.push(p),
            }
        }
        self.pending = kept;
        if full {
            self.diagnostic(Diagnostic::MeshRingFull);
        }
    }

    fn upload(&mut self) {
        let deadline = Instant::now() + self.cfg.budget.upload();
        for r in self.pipeline.drain_ready(deadline) {
            self.apply_result(&r);
            self.pipeline.recycle(r);
        }
    }

    fn apply_result(&mut self, r: &MeshResult) {
        let chunk = self.arena.get_mut(r.chunk);
        if chunk.generation != r.generation || !chunk.is_populated() {
            self.report.stale_results += 1;
            return;
        }
        if r.failed {
            chunk.render = RenderState::Pending;
            return;
        }
        let collider_changed = chunk.uploaded_voxel_signature != Some(r.voxel_signature);
        self.sink.upload(&MeshUpload {
            chunk: r.chunk,
            coord: r.coord,
            buffers: &r.buffers,
            collider_changed,
        });
        chunk.uploaded_voxel_signature = Some(r.voxel_signature);
        chunk.has_mesh = true;
        chunk.render = RenderState::RenderingComplete;
        let current = chunk.mesh_request == r.request;
        if current {
            chunk.needs_mesh_rebuild = false;
        }
        let first = !chunk.first_rendered && chunk.inconclusive == 0;
        if first {
            chunk.first_rendered = true;
            self.events.first_rendered(chunk);
        }
        self.events.mesh_ready(chunk);
        self.report.uploaded += 1;
        if !current {
            self.enqueue(r.chunk, QueueFlags::MESH);
        }
    }

    /// Resumable sweep over the arena. Chunks past the view only lose
    /// visibility; past the unload distance they are released unless
    /// modified or pinned.
    fn unload_scan(&mut self) {
        let n = self.arena.allocated();
        if n == 0 {
            return;
        }
        let deadline = Instant::now() + self.cfg.budget.unload();
        let v = &self.cfg.view;
        let margin = v.unload_margin.max(0);
        let (ux, uy) = (v.distance_xz + margin, v.distance_y + margin);
        for step in 0..n {
            if step % 16 == 15 && Instant::now() >= deadline {
                break;
            }
            let i = self.unload_cursor % n;
            self.unload_cursor = (i + 1) % n;
            let id = ChunkId(i as u32);
            let coord = self.arena.get(id).coord;
            if !self.arena.get(id).is_live() || self.in_view(coord) {
                continue;
            }
            let keep = self.observer.within_view(coord, ux, uy);
            let chunk = self.arena.get_mut(id);
            if chunk.visible {
                chunk.visible = false;
                self.events.visibility_changed(chunk, false);
            }
            if keep || chunk.modified || chunk.pinned {
                continue;
            }
            self.detach(id);
            self.arena.release(id);
            self.report.unloaded += 1;
        }
    }

    /// Replaces one voxel. Creates the chunk if needed; an empty shell gets
    /// a real voxel array on the first edit with content.
    pub fn set_voxel(&mut self, wx: i32, wy: i32, wz: i32, voxel: Voxel) -> Result<(), StreamError> {
        let (coord, idx) = query::locate(wx, wy, wz);
        let id = self.lookup_or_create(coord)?;
        let emission = self.materials.emission(voxel.material());
        let chunk = self.arena.get_mut(id);
        if chunk.voxels.is_none() {
            if !voxel.has_content() {
                return Ok(());
            }
            materialize(chunk);
        }
        let mut v = voxel;
        v.clear_light();
        let sig = chunk.voxels_mut().map(|g| {
            *g.at_mut(idx) = v;
            g.content_signature()
        });
        if let Some(s) = sig {
            chunk.voxel_signature = s;
        }
        chunk.modified = true;
        if emission > 0 {
            chunk.set_emitter(idx as u16, emission);
        } else {
            chunk.remove_emitter(idx as u16);
        }
        self.events.chunk_changed(chunk);
        self.invalidate_light_around(coord, true);
        Ok(())
    }

    /// Registers a point light at a world voxel.
    pub fn place_light(&mut self, wx: i32, wy: i32, wz: i32, intensity: u8) -> Result<(), StreamError> {
        let (coord, idx) = query::locate(wx, wy, wz);
        let id = self.lookup_or_create(coord)?;
        let chunk = self.arena.get_mut(id);
        if chunk.voxels.is_none() {
            materialize(chunk);
        }
        chunk.set_emitter(idx as u16, intensity.min(LIGHT_MAX));
        chunk.modified = true;
        self.events.chunk_changed(chunk);
        self.invalidate_light_around(coord, true);
        Ok(())
    }

    /// Removes a point light; false if none was registered there.
    pub fn remove_light(&mut self, wx: i32, wy: i32, wz: i32) -> bool {
        let (coord, idx) = query::locate(wx, wy, wz);
        let Some(id) = self.directory.lookup(coord) else {
            return false;
        };
        let chunk = self.arena.get_mut(id);
        if !chunk.remove_emitter(idx as u16) {
            return false;
        }
        self.events.chunk_changed(chunk);
        self.invalidate_light_around(coord, true);
        true
    }

    /// Marks a loaded chunk as never reusable (or reusable again).
    pub fn set_pinned(&mut self, coord: ChunkCoord, pinned: bool) -> bool {
        match self.directory.lookup(coord) {
            Some(id) => {
                self.arena.set_pinned(id, pinned);
                true
            }
            None => false,
        }
    }

    /// Drops every chunk and restarts discovery; the worker pool keeps running.
    pub fn reset(&mut self) {
        let live: Vec<ChunkId> = self.arena.iter_live().map(|c| c.id).collect();
        for id in live {
            let c = self.arena.get_mut(id);
            if c.has_mesh {
                c.has_mesh = false;
                self.sink.release(id, c.coord);
            }
        }
        self.queue.clear(&mut self.arena);
        self.pending.clear();
        self.directory.clear();
        self.arena.reset_all();
        self.octree = VisibilityOctree::new(
            self.cfg.view.distance_xz,
            self.cfg.view.distance_y,
            self.cfg.queue.octree_stack_capacity,
        );
        self.last_observer = None;
        self.unload_cursor = 0;
        self.columns.clear();
    }

    /// Stops the mesh workers. Later frames keep streaming but nothing new
    /// is meshed.
    pub fn shutdown(&mut self) {
        self.pipeline.shutdown();
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn materialize(chunk: &mut Chunk) {
    let grid = VoxelGrid::air();
    chunk.voxel_signature = grid.content_signature();
    chunk.voxels = Some(Arc::new(grid));
    chunk.population = Population::Populated;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
