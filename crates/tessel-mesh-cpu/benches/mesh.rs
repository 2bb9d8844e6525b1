use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use tessel_blocks::{MaterialTable, Voxel};
use tessel_chunk::VoxelGrid;
use tessel_mesh_cpu::{ChunkMesher, MeshBuffers, Neighborhood};
use tessel_world::{CHUNK_VOLUME, ChunkCoord, NoiseTerrain, TerrainFill, TerrainParams};

fn terrain_grid(table: &MaterialTable, coord: ChunkCoord) -> VoxelGrid {
    let terrain = NoiseTerrain::new(table, TerrainParams::default());
    let mut voxels = vec![Voxel::AIR; CHUNK_VOLUME];
    terrain.fill(coord, &mut voxels);
    VoxelGrid::from_voxels(voxels)
}

fn bench_mesh_surface_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_surface_chunk");
    let table = MaterialTable::builtin();
    let center = Arc::new(terrain_grid(&table, ChunkCoord::new(0, 1, 0)));
    let nb = Neighborhood::isolated(center, Arc::new(VoxelGrid::air()));
    let mut mesher = ChunkMesher::new(&table);
    let mut out = MeshBuffers::default();
    group.bench_function("noise_16", |b| {
        b.iter(|| {
            mesher.build(black_box(&nb), &mut out);
            black_box(out.quad_count());
        })
    });
    group.finish();
}

fn bench_mesh_checkerboard(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_checkerboard");
    let table = MaterialTable::builtin();
    let stone = table.voxel("stone").unwrap_or(Voxel::AIR);
    let voxels = (0..CHUNK_VOLUME)
        .map(|i| if (i + i / 16 + i / 256) % 2 == 0 { stone } else { Voxel::AIR })
        .collect();
    let nb = Neighborhood::isolated(Arc::new(VoxelGrid::from_voxels(voxels)), Arc::new(VoxelGrid::air()));
    let mut mesher = ChunkMesher::new(&table);
    let mut out = MeshBuffers::default();
    group.bench_function("worst_case_16", |b| {
        b.iter(|| {
            mesher.build(black_box(&nb), &mut out);
            black_box(out.quad_count());
        })
    });
    group.finish();
}

criterion_group!(benches, bench_mesh_surface_chunk, bench_mesh_checkerboard);
criterion_main!(benches);
