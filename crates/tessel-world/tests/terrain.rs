use tessel_blocks::{MaterialTable, Voxel};
use tessel_world::{
    CHUNK_VOLUME, ChunkCoord, FlatTerrain, HeightQuery, NoiseTerrain, TerrainFill, TerrainParams,
    voxel_index,
};

fn fill(t: &dyn TerrainFill, c: ChunkCoord) -> (Vec<Voxel>, tessel_world::FillReport) {
    let mut v = vec![Voxel::AIR; CHUNK_VOLUME];
    let r = t.fill(c, &mut v);
    (v, r)
}

#[test]
fn flat_terrain_splits_surface_and_sky() {
    let table = MaterialTable::builtin();
    let flat = FlatTerrain::new(&table, 4);
    let (v, r) = fill(&flat, ChunkCoord::new(0, 0, 0));
    assert!(r.has_content);
    assert!(!r.above_surface);
    let grass = table.id_by_name("grass").unwrap();
    assert_eq!(v[voxel_index(3, 4, 7)].material(), grass);
    assert!(!v[voxel_index(3, 5, 7)].has_content());

    let (_, sky) = fill(&flat, ChunkCoord::new(2, 1, -3));
    assert!(!sky.has_content);
    assert!(sky.above_surface);

    let (_, deep) = fill(&flat, ChunkCoord::new(0, -2, 0));
    assert!(deep.has_content);
    assert!(!deep.above_surface);
}

#[test]
fn noise_terrain_is_deterministic_per_seed() {
    let table = MaterialTable::builtin();
    let a = NoiseTerrain::new(&table, TerrainParams { seed: 7, ..Default::default() });
    let b = NoiseTerrain::new(&table, TerrainParams { seed: 7, ..Default::default() });
    for (x, z) in [(0, 0), (15, -40), (300, 12)] {
        assert_eq!(a.sample(x, z), b.sample(x, z));
    }
    let c = ChunkCoord::new(1, 1, 1);
    assert_eq!(fill(&a, c).0, fill(&b, c).0);
}

#[test]
fn params_parse_with_defaults() {
    let p: TerrainParams = toml::from_str("seed = 3\nwater_level = 10").unwrap();
    assert_eq!(p.seed, 3);
    assert_eq!(p.water_level, 10);
    assert_eq!(p.base_height, TerrainParams::default().base_height);
}
