use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tessel_blocks::{MaterialTable, Voxel};
use tessel_chunk::Population;
use tessel_geom::Vec3;
use tessel_runtime::{
    ChunkEvents, Collaborators, Diagnostic, FrameReport, MeshSink, MeshUpload, Observer, Stage, StreamConfig,
    Streamer,
};
use tessel_world::{
    CHUNK_SIZE, ChunkCoord, ChunkId, ColumnSample, Face, FillReport, FlatTerrain, HeightQuery, KEY_ENVELOPE,
    TerrainFill,
};
use tessel_chunk::Chunk;

fn config(view: i32, capacity: usize) -> StreamConfig {
    let mut cfg = StreamConfig::default();
    cfg.view.distance_xz = view;
    cfg.view.distance_y = view;
    cfg.view.frustum_culling = false;
    cfg.arena.capacity = capacity;
    cfg.budget.explore_ms = 1000.0;
    cfg.budget.render_queue_ms = 1000.0;
    cfg.budget.unload_ms = 1000.0;
    cfg.budget.upload_ms = 20.0;
    cfg.budget.max_creations_per_frame = 100_000;
    cfg.meshing.workers = 2;
    cfg
}

fn flat_streamer(cfg: StreamConfig, ground: i32) -> Streamer {
    let table = Arc::new(MaterialTable::builtin());
    let terrain = Arc::new(FlatTerrain::new(&table, ground));
    Streamer::new(cfg, table, Collaborators::new(terrain)).unwrap()
}

fn observer_at(c: ChunkCoord) -> Observer {
    let s = CHUNK_SIZE as f32;
    Observer::at(Vec3::new(
        c.cx as f32 * s + 0.5,
        c.cy as f32 * s + 0.5,
        c.cz as f32 * s + 0.5,
    ))
}

fn settle(s: &mut Streamer, o: &Observer) -> FrameReport {
    for _ in 0..5000 {
        let r = s.update(o);
        assert!(r.aborted.is_none(), "frame aborted: {:?}", r.aborted);
        if r.is_settled() {
            return r;
        }
        if r.in_flight > 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    panic!("streamer did not settle");
}

#[test]
fn static_observer_loads_exactly_the_view_cube() {
    let mut s = flat_streamer(config(4, 1024), 8);
    let origin = ChunkCoord::new(0, 0, 0);
    settle(&mut s, &observer_at(origin));

    assert_eq!(s.directory().chunk_count(), 729);
    assert_eq!(s.arena().live(), 729);
    for (coord, id) in s.directory().coords_with_chunks() {
        assert!(origin.within_view(coord, 4, 4), "{coord:?} outside view");
        let c = s.arena().get(id);
        assert!(matches!(c.population, Population::Populated | Population::Empty));
        assert_eq!(c.coord, coord);
    }
    // Ground chunks carry voxels, sky chunks are empty shells.
    assert!(s.chunk_at(ChunkCoord::new(0, 0, 0)).unwrap().is_populated());
    assert!(!s.chunk_at(ChunkCoord::new(0, 2, 0)).unwrap().is_populated());
}

#[test]
fn populated_chunks_end_up_meshed() {
    let mut s = flat_streamer(config(2, 256), 8);
    settle(&mut s, &observer_at(ChunkCoord::new(0, 0, 0)));
    for c in s.arena().iter_live().filter(|c| c.is_populated()) {
        assert!(c.has_mesh, "{:?} has no mesh", c.coord);
        assert!(!c.needs_mesh_rebuild, "{:?} still waiting", c.coord);
        assert!(!c.in_queue);
    }
    // Open air above the ground is sunlit.
    let hit = s.voxel_at(3, 9, 3).unwrap();
    assert_eq!(hit.voxel.sun(), 15);
}

#[test]
fn torch_light_appears_and_clears() {
    let mut s = flat_streamer(config(2, 256), 8);
    let o = observer_at(ChunkCoord::new(0, 0, 0));
    settle(&mut s, &o);

    s.place_light(8, 9, 8, 12).unwrap();
    settle(&mut s, &o);
    assert_eq!(s.voxel_at(8, 9, 8).unwrap().voxel.torch(), 12);
    assert_eq!(s.voxel_at(10, 9, 8).unwrap().voxel.torch(), 10);

    let lit: Vec<ChunkId> = s
        .arena()
        .iter_live()
        .filter(|c| c.voxels.as_ref().is_some_and(|g| g.as_slice().iter().any(|v| v.torch() > 0)))
        .map(|c| c.id)
        .collect();
    assert!(!lit.is_empty());

    assert!(s.remove_light(8, 9, 8));
    assert!(!s.remove_light(8, 9, 8));
    for &id in &lit {
        assert!(s.arena().get(id).needs_mesh_rebuild);
    }
    settle(&mut s, &o);
    for c in s.arena().iter_live() {
        if let Some(g) = c.voxels.as_ref() {
            assert!(g.as_slice().iter().all(|v| v.torch() == 0), "stale torch light in {:?}", c.coord);
        }
    }
}

#[test]
fn voxel_edits_are_visible_to_queries_and_rays() {
    let table = MaterialTable::builtin();
    let stone = table.voxel("stone").unwrap();
    let mut s = flat_streamer(config(2, 256), 8);
    let o = observer_at(ChunkCoord::new(0, 0, 0));
    settle(&mut s, &o);

    // Into a sky chunk that had no voxel array yet.
    s.set_voxel(4, 20, 4, stone).unwrap();
    let chunk = s.chunk_at(ChunkCoord::new(0, 1, 0)).unwrap();
    assert!(chunk.is_populated());
    assert!(chunk.modified);
    assert_eq!(s.voxel_at(4, 20, 4).unwrap().voxel.material(), stone.material());

    let (hit, voxel) = s
        .raycast(Vec3::new(4.5, 30.5, 4.5), Vec3::new(0.0, -1.0, 0.0), 40.0)
        .unwrap();
    assert_eq!(hit.block, [4, 20, 4]);
    assert_eq!(voxel.coord, ChunkCoord::new(0, 1, 0));

    s.set_voxel(4, 20, 4, Voxel::AIR).unwrap();
    let (hit, _) = s
        .raycast(Vec3::new(4.5, 30.5, 4.5), Vec3::new(0.0, -1.0, 0.0), 40.0)
        .unwrap();
    assert_eq!(hit.block, [4, 8, 4]);
    settle(&mut s, &o);
}

#[test]
fn walking_keeps_the_arena_bounded() {
    let capacity = 200;
    let mut s = flat_streamer(config(2, capacity), 8);
    let mut reused = 0;
    let mut unloaded = 0;
    let mut at = ChunkCoord::new(0, 0, 0);
    for step in 0..12 {
        at = ChunkCoord::new(step, 0, 0);
        let o = observer_at(at);
        for _ in 0..3 {
            let r = s.update(&o);
            assert!(r.aborted.is_none());
            assert!(r.live_chunks <= capacity);
            reused += r.reused;
            unloaded += r.unloaded;
        }
    }
    settle(&mut s, &observer_at(at));
    assert!(s.arena().live() <= capacity);
    assert!(reused + unloaded > 0);
    for dy in -2..=2 {
        for dz in -2..=2 {
            for dx in -2..=2 {
                let c = at.offset(dx, dy, dz);
                assert!(s.chunk_at(c).is_some(), "{c:?} missing");
            }
        }
    }
    // Nothing far behind the observer is still bound in the directory.
    for (coord, _) in s.directory().coords_with_chunks() {
        assert!(at.within_view(coord, 2 + 2, 2 + 2), "{coord:?} lingered");
    }
}

#[test]
fn modified_chunks_survive_unloading() {
    let table = MaterialTable::builtin();
    let stone = table.voxel("stone").unwrap();
    let mut s = flat_streamer(config(1, 128), 8);
    settle(&mut s, &observer_at(ChunkCoord::new(0, 0, 0)));
    s.set_voxel(1, 9, 1, stone).unwrap();

    let far = observer_at(ChunkCoord::new(10, 0, 0));
    settle(&mut s, &far);
    let kept = s.chunk_at(ChunkCoord::new(0, 0, 0)).unwrap();
    assert!(kept.modified);
    assert_eq!(s.voxel_at(1, 9, 1).unwrap().voxel.material(), stone.material());
}

struct PanicOnce {
    inner: FlatTerrain,
    target: ChunkCoord,
    armed: AtomicBool,
}

impl TerrainFill for PanicOnce {
    fn fill(&self, coord: ChunkCoord, voxels: &mut [Voxel]) -> FillReport {
        if coord == self.target && self.armed.swap(false, Ordering::SeqCst) {
            panic!("generator failure at {coord:?}");
        }
        self.inner.fill(coord, voxels)
    }
}

impl HeightQuery for PanicOnce {
    fn sample(&self, x: i32, z: i32) -> ColumnSample {
        self.inner.sample(x, z)
    }
}

#[test]
fn panicking_generator_abandons_only_one_frame() {
    let table = Arc::new(MaterialTable::builtin());
    let terrain = Arc::new(PanicOnce {
        inner: FlatTerrain::new(&table, 8),
        target: ChunkCoord::new(1, 0, 0),
        armed: AtomicBool::new(true),
    });
    let mut s = Streamer::new(config(2, 256), table, Collaborators::new(terrain)).unwrap();
    let o = observer_at(ChunkCoord::new(0, 0, 0));

    let first = s.update(&o);
    let (stage, message) = first.aborted.expect("first frame should abort");
    assert_eq!(stage, Stage::NearScan);
    assert!(message.contains("generator failure"));

    settle(&mut s, &o);
    assert!(s.chunk_at(ChunkCoord::new(1, 0, 0)).unwrap().is_populated());
    assert_eq!(s.arena().live(), s.directory().chunk_count());
    assert_eq!(s.directory().chunk_count(), 125);
}

#[test]
fn deferred_work_runs_on_the_next_frame() {
    let mut s = flat_streamer(config(1, 64), 8);
    let ran = Arc::new(AtomicUsize::new(0));
    let handle = s.deferred();
    let r = Arc::clone(&ran);
    std::thread::spawn(move || {
        handle.schedule(move |st: &mut Streamer| {
            r.store(st.arena().live() + 1, Ordering::SeqCst);
        });
    })
    .join()
    .unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    s.update(&observer_at(ChunkCoord::new(0, 0, 0)));
    // Runs first in the frame, before anything was loaded.
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct Log {
    created: usize,
    first_rendered: Vec<ChunkCoord>,
    uploads: usize,
    releases: usize,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Log>>);

impl ChunkEvents for Recorder {
    fn after_create(&mut self, _chunk: &Chunk) {
        self.0.lock().unwrap().created += 1;
    }

    fn first_rendered(&mut self, chunk: &Chunk) {
        self.0.lock().unwrap().first_rendered.push(chunk.coord);
    }

    fn diagnostic(&mut self, d: Diagnostic) {
        self.0.lock().unwrap().diagnostics.push(d);
    }
}

impl MeshSink for Recorder {
    fn upload(&mut self, _upload: &MeshUpload<'_>) {
        self.0.lock().unwrap().uploads += 1;
    }

    fn release(&mut self, _chunk: ChunkId, _coord: ChunkCoord) {
        self.0.lock().unwrap().releases += 1;
    }
}

#[test]
fn events_and_sink_observe_the_stream() {
    let table = Arc::new(MaterialTable::builtin());
    let terrain = Arc::new(FlatTerrain::new(&table, 8));
    let rec = Recorder::default();
    let collab = Collaborators::new(terrain)
        .with_events(rec.clone())
        .with_sink(rec.clone());
    let mut s = Streamer::new(config(1, 64), table, collab).unwrap();
    let o = observer_at(ChunkCoord::new(0, 0, 0));
    settle(&mut s, &o);

    let log = rec.0.lock().unwrap();
    assert_eq!(log.created, 27);
    let populated = s.arena().iter_live().filter(|c| c.is_populated()).count();
    assert!(log.uploads >= populated);
    // Inner chunks see every neighbour and report exactly once.
    let mut seen = log.first_rendered.clone();
    seen.sort_by_key(|c| (c.cx, c.cy, c.cz));
    seen.dedup();
    assert_eq!(seen.len(), log.first_rendered.len());
    assert!(seen.contains(&ChunkCoord::new(0, 0, 0)));
}

#[test]
fn tiny_arena_reports_exhaustion() {
    let mut cfg = config(1, 8);
    cfg.arena.grow_batch = 8;
    let mut s = flat_streamer(cfg, 8);
    let r = s.update(&observer_at(ChunkCoord::new(0, 0, 0)));
    assert!(r.aborted.is_none());
    assert!(r.diagnostics.contains(&Diagnostic::ArenaExhausted));
    assert_eq!(s.arena().live(), 8);
    assert!(s.diagnostic_count(Diagnostic::ArenaExhausted) >= 1);
}

#[test]
fn jump_loads_the_near_cube_without_exploring() {
    let mut cfg = config(4, 1024);
    cfg.budget.explore_ms = 0.0;
    let mut s = flat_streamer(cfg, 8);

    let first = s.update(&observer_at(ChunkCoord::new(0, 0, 0)));
    assert_eq!(first.created, 27);

    let target = ChunkCoord::new(50, 0, 0);
    let r = s.update(&observer_at(target));
    assert!(r.aborted.is_none());
    assert_eq!(r.created, 27);
    for dy in -1..=1 {
        for dz in -1..=1 {
            for dx in -1..=1 {
                let c = target.offset(dx, dy, dz);
                assert!(s.chunk_at(c).is_some(), "{c:?} missing after jump");
            }
        }
    }

    // A single-cell step is not a jump and creates nothing without exploring.
    let step = s.update(&observer_at(ChunkCoord::new(51, 0, 0)));
    assert_eq!(step.created, 0);
    assert!(s.chunk_at(ChunkCoord::new(52, 0, 0)).is_none());
}

#[test]
fn new_neighbour_refreshes_a_chunk_meshed_without_it() {
    let mut cfg = config(2, 64);
    cfg.budget.explore_ms = 0.0;
    cfg.view.force_radius = 0;
    let mut s = flat_streamer(cfg, 8);
    let o = observer_at(ChunkCoord::new(0, 0, 0));
    let origin = ChunkCoord::new(0, 0, 0);

    for _ in 0..5000 {
        let r = s.update(&o);
        assert!(r.aborted.is_none());
        let c = s.chunk_at(origin).unwrap();
        if c.has_mesh && !c.in_queue && r.in_flight == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    let c = s.chunk_at(origin).unwrap();
    assert!(c.has_mesh);
    assert!(!c.in_queue);
    assert_eq!(c.inconclusive, 0b11_1111, "lit with every neighbour missing");

    s.lookup_or_create(ChunkCoord::new(1, 0, 0)).unwrap();
    let c = s.chunk_at(origin).unwrap();
    assert_eq!(c.inconclusive & Face::PosX.bit(), 0);
    assert_eq!(c.inconclusive, 0b11_1111 & !Face::PosX.bit());
    assert!(c.in_queue);
}

#[test]
fn exploring_skips_cells_past_the_key_envelope() {
    let mut s = flat_streamer(config(2, 256), 8);
    let edge = ChunkCoord::new(KEY_ENVELOPE - 1, 0, 0);
    let r = settle(&mut s, &observer_at(edge));
    assert!(r.explore_idle);
    // Two of the five columns along x lie outside the addressable world.
    assert_eq!(s.directory().chunk_count(), 3 * 5 * 5);
    assert!(s.chunk_at(edge.offset(-2, 2, -2)).is_some());
    assert!(s.lookup_or_create(edge.offset(1, 0, 0)).is_err());
}

#[test]
fn pinned_chunks_survive_unloading() {
    let mut s = flat_streamer(config(1, 128), 8);
    settle(&mut s, &observer_at(ChunkCoord::new(0, 0, 0)));
    let home = ChunkCoord::new(0, 0, 0);
    assert!(s.set_pinned(home, true));
    assert!(!s.set_pinned(ChunkCoord::new(30, 0, 0), true));

    settle(&mut s, &observer_at(ChunkCoord::new(10, 0, 0)));
    assert!(s.chunk_at(home).unwrap().pinned);
    assert!(s.chunk_at(ChunkCoord::new(1, 0, 0)).is_none());

    assert!(s.set_pinned(home, false));
    settle(&mut s, &observer_at(ChunkCoord::new(11, 0, 0)));
    assert!(s.chunk_at(home).is_none());
}

