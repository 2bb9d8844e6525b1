use proptest::prelude::*;
use tessel_blocks::{LIGHT_MAX, MaterialTable, Voxel};
use tessel_chunk::{Emitter, VoxelGrid};
use tessel_lighting::{LightEngine, LightInput, LightNeighbor};
use tessel_world::{CHUNK_SIZE, CHUNK_VOLUME, Face, voxel_index, voxel_position};

fn palette() -> Vec<Voxel> {
    let t = MaterialTable::builtin();
    vec![
        Voxel::AIR,
        Voxel::AIR,
        Voxel::AIR,
        t.voxel("stone").unwrap(),
        t.voxel("glass").unwrap(),
        t.voxel("water").unwrap(),
        t.voxel("leaves").unwrap(),
    ]
}

fn grid() -> impl Strategy<Value = VoxelGrid> {
    let pal = palette();
    prop::collection::vec(0usize..pal.len(), CHUNK_VOLUME)
        .prop_map(move |ix| VoxelGrid::from_voxels(ix.into_iter().map(|i| pal[i]).collect()))
}

fn emitters() -> impl Strategy<Value = Vec<Emitter>> {
    prop::collection::vec(
        (0..CHUNK_VOLUME as u16, 1u8..=LIGHT_MAX).prop_map(|(index, intensity)| Emitter { index, intensity }),
        0..4,
    )
}

fn decay(light: u8, opacity: u8, dir: Face, sun: bool) -> u8 {
    if sun && dir == Face::NegY && light == LIGHT_MAX && opacity == 0 {
        return LIGHT_MAX;
    }
    light.saturating_sub(opacity + 1)
}

fn neighbors_with<'a>(face: Face, n: &'a VoxelGrid, emitters: &'a [Emitter]) -> [LightNeighbor<'a>; 6] {
    let mut out = [LightNeighbor::Uniform { sun: 0, torch: 0 }; 6];
    out[Face::PosY.index()] = LightNeighbor::Uniform { sun: LIGHT_MAX, torch: 0 };
    out[face.index()] = LightNeighbor::Grid { grid: n, emitters };
    out
}

/// Every in-chunk step from a lit voxel to a non-opaque neighbour has been applied.
fn assert_settled(g: &VoxelGrid, emitters: &[Emitter]) -> Result<(), TestCaseError> {
    let s = CHUNK_SIZE as i32;
    for idx in 0..CHUNK_VOLUME {
        let v = g.at(idx);
        prop_assert!(v.sun() <= LIGHT_MAX && v.torch() <= LIGHT_MAX);
        let source = emitters.iter().any(|e| e.index as usize == idx);
        let (x, y, z) = voxel_position(idx);
        for face in Face::ALL {
            let (dx, dy, dz) = face.delta();
            let (nx, ny, nz) = (x as i32 + dx, y as i32 + dy, z as i32 + dz);
            if nx < 0 || ny < 0 || nz < 0 || nx >= s || ny >= s || nz >= s {
                continue;
            }
            let n = g.get(nx as usize, ny as usize, nz as usize);
            if n.is_opaque() {
                continue;
            }
            if v.sun() > v.opacity() {
                prop_assert!(n.sun() >= decay(v.sun(), v.opacity(), face, true));
            }
            let op = if source { 0 } else { v.opacity() };
            if v.torch() > op {
                prop_assert!(n.torch() >= decay(v.torch(), op, face, false));
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // Light never exceeds what its brightest neighbour can hand on
    #[test]
    fn light_is_supported_and_settled(mut g in grid(), em in emitters()) {
        let dark = VoxelGrid::air();
        let mut engine = LightEngine::default();
        let input = LightInput {
            neighbors: neighbors_with(Face::NegY, &dark, &[]),
            emitters: &em,
            fresh: true,
            above_surface: true,
        };
        let r = engine.compute(&mut g, &input);
        prop_assert!(!r.overflowed);
        assert_settled(&g, &em)?;
        let s = CHUNK_SIZE as i32;
        for idx in 0..CHUNK_VOLUME {
            let v = g.at(idx);
            let (x, y, z) = voxel_position(idx);
            if em.iter().any(|e| e.index as usize == idx) || y == CHUNK_SIZE - 1 {
                continue;
            }
            let mut best_sun = 0;
            let mut best_torch = 0;
            for face in Face::ALL {
                let (dx, dy, dz) = face.delta();
                let (nx, ny, nz) = (x as i32 + dx, y as i32 + dy, z as i32 + dz);
                if nx < 0 || ny < 0 || nz < 0 || nx >= s || ny >= s || nz >= s {
                    continue;
                }
                let n = g.get(nx as usize, ny as usize, nz as usize);
                let nidx = voxel_index(nx as usize, ny as usize, nz as usize);
                let nop = if em.iter().any(|e| e.index as usize == nidx) { 0 } else { n.opacity() };
                best_sun = best_sun.max(decay(n.sun(), n.opacity(), face.opposite(), true));
                best_torch = best_torch.max(decay(n.torch(), nop, face.opposite(), false));
            }
            prop_assert!(v.sun() <= best_sun, "sun {} > {} at {:?}", v.sun(), best_sun, (x, y, z));
            prop_assert!(v.torch() <= best_torch, "torch {} > {} at {:?}", v.torch(), best_torch, (x, y, z));
        }
    }

    // Two settled neighbours agree across their shared face, and relighting
    // either one again changes nothing
    #[test]
    fn settled_neighbours_agree_across_face(mut a in grid(), mut b in grid(), ea in emitters(), eb in emitters()) {
        let mut engine = LightEngine::default();
        let mut fresh = true;
        for _ in 0..32 {
            let ra = {
                let input = LightInput { neighbors: neighbors_with(Face::PosX, &b, &eb), emitters: &ea, fresh, above_surface: true };
                engine.compute(&mut a, &input)
            };
            let rb = {
                let input = LightInput { neighbors: neighbors_with(Face::NegX, &a, &ea), emitters: &eb, fresh, above_surface: true };
                engine.compute(&mut b, &input)
            };
            let quiet = !fresh && ra.changed_voxels == 0 && rb.changed_voxels == 0;
            fresh = false;
            if quiet {
                break;
            }
        }
        let last = CHUNK_SIZE - 1;
        for y in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let va = a.get(last, y, z);
                let vb = b.get(0, y, z);
                let ia = voxel_index(last, y, z);
                let ib = voxel_index(0, y, z);
                let opa = if ea.iter().any(|e| e.index as usize == ia) { 0 } else { va.opacity() };
                let opb = if eb.iter().any(|e| e.index as usize == ib) { 0 } else { vb.opacity() };
                if !vb.is_opaque() {
                    prop_assert!(vb.sun() >= decay(va.sun(), va.opacity(), Face::PosX, true));
                    prop_assert!(vb.torch() >= decay(va.torch(), opa, Face::PosX, false));
                }
                if !va.is_opaque() {
                    prop_assert!(va.sun() >= decay(vb.sun(), vb.opacity(), Face::NegX, true));
                    prop_assert!(va.torch() >= decay(vb.torch(), opb, Face::NegX, false));
                }
            }
        }
        let before = tessel_lighting::signature(&a);
        let input = LightInput { neighbors: neighbors_with(Face::PosX, &b, &eb), emitters: &ea, fresh: false, above_surface: true };
        let r = engine.compute(&mut a, &input);
        prop_assert_eq!(r.signature, before);
        assert_settled(&a, &ea)?;
    }
}
