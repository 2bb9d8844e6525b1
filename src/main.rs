//! Headless driver: flies an observer across the world and logs streaming
//! statistics. Useful for profiling the runtime without a renderer.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;
use tessel_blocks::MaterialTable;
use tessel_geom::{Frustum, Vec3};
use tessel_mesh_cpu::PartKind;
use tessel_runtime::{Collaborators, MeshSink, MeshUpload, Observer, StreamConfig, Streamer};
use tessel_world::{ChunkCoord, ChunkId, FlatTerrain, NoiseTerrain, TerrainParams};

#[derive(Parser, Debug)]
#[command(name = "tessel", about = "Stream a voxel world around a moving observer")]
struct Args {
    /// Streaming configuration (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Material table (TOML); the built-in table when omitted.
    #[arg(long)]
    materials: Option<PathBuf>,
    /// Noise terrain parameters (TOML).
    #[arg(long)]
    terrain: Option<PathBuf>,
    #[arg(long, default_value_t = 600)]
    frames: u64,
    /// Observer speed in voxels per second, at a fixed 60 Hz step.
    #[arg(long, default_value_t = 12.0)]
    speed: f32,
    #[arg(long, default_value_t = 1337)]
    seed: i32,
    /// Overrides the horizontal and vertical view distance.
    #[arg(long)]
    view: Option<i32>,
    #[arg(long)]
    workers: Option<usize>,
    /// Flat world with the ground at this height instead of noise terrain.
    #[arg(long)]
    flat: Option<i32>,
}

/// Counts what a renderer would receive.
#[derive(Default)]
struct StatsSink {
    uploads: u64,
    releases: u64,
    quads: u64,
    liquid_quads: u64,
    collider_updates: u64,
}

impl MeshSink for StatsSink {
    fn upload(&mut self, upload: &MeshUpload<'_>) {
        self.uploads += 1;
        self.quads += upload.buffers.quad_count() as u64;
        self.liquid_quads += upload
            .buffers
            .parts()
            .filter(|p| p.kind == PartKind::Liquid)
            .map(|p| p.build.quad_count() as u64)
            .sum::<u64>();
        if upload.collider_changed {
            self.collider_updates += 1;
        }
    }

    fn release(&mut self, _chunk: ChunkId, _coord: ChunkCoord) {
        self.releases += 1;
    }
}

impl Drop for StatsSink {
    fn drop(&mut self) {
        info!(
            "meshes: {} uploads ({} collider updates), {} releases, {} quads ({} liquid)",
            self.uploads, self.collider_updates, self.releases, self.quads, self.liquid_quads
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(p) => StreamConfig::load_from_path(p)?,
        None => StreamConfig::default(),
    };
    if let Some(v) = args.view {
        cfg.view.distance_xz = v;
        cfg.view.distance_y = (v / 2).max(1);
    }
    if let Some(w) = args.workers {
        cfg.meshing.workers = w;
    }

    let materials = Arc::new(match &args.materials {
        Some(p) => MaterialTable::load_from_path(p)?,
        None => MaterialTable::builtin(),
    });

    let collab = match args.flat {
        Some(ground) => Collaborators::new(Arc::new(FlatTerrain::new(&materials, ground))),
        None => {
            let mut params = match &args.terrain {
                Some(p) => TerrainParams::load_from_path(p)?,
                None => TerrainParams::default(),
            };
            params.seed = args.seed;
            Collaborators::new(Arc::new(NoiseTerrain::new(&materials, params)))
        }
    };
    let collab = collab.with_sink(StatsSink::default());

    info!(
        "streaming {} frames, view {}x{}, {} mesh workers",
        args.frames,
        cfg.view.distance_xz,
        cfg.view.distance_y,
        cfg.meshing.worker_count()
    );
    let culling = cfg.view.frustum_culling;
    let mut streamer = Streamer::new(cfg, materials, collab)?;

    let dt = 1.0 / 60.0;
    let forward = Vec3::new(1.0, -0.15, 0.35).normalized();
    let mut pos = Vec3::new(0.5, 0.0, 0.5);
    let mut aborted = 0;
    for _ in 0..args.frames {
        // Hover a few voxels above the terrain.
        pos.y = streamer.column(pos.x.floor() as i32, pos.z.floor() as i32).ground as f32 + 8.0;
        let frustum = culling.then(|| Frustum::from_camera(pos, forward, Vec3::UP, 1.2, 16.0 / 9.0, 0.1, 512.0));
        let report = streamer.update(&Observer { position: pos, frustum });
        if report.aborted.is_some() {
            aborted += 1;
        }
        if report.frame % 60 == 0 {
            info!(
                "frame {}: {} live, {} queued, {} in flight, +{} created, {} reused, {} unloaded, {:.2}ms",
                report.frame,
                report.live_chunks,
                report.queue_len,
                report.in_flight,
                report.created,
                report.reused,
                report.unloaded,
                report.elapsed.as_secs_f64() * 1000.0
            );
        }
        pos = pos + Vec3::new(forward.x, 0.0, forward.z) * (args.speed * dt);
    }

    let cols = streamer.column_stats();
    info!(
        "done: {} chunks loaded, column cache {} hits / {} misses, {} aborted frames",
        streamer.directory().chunk_count(),
        cols.hits,
        cols.misses,
        aborted
    );
    streamer.shutdown();
    Ok(())
}
