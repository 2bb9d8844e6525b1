use std::sync::Arc;

use tessel_blocks::Voxel;
use tessel_world::{CHUNK_SIZE, CHUNK_VOLUME, voxel_index};

/// Dense `CHUNK_SIZE³` voxel array in `voxel_index` order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelGrid {
    voxels: Box<[Voxel]>,
}

impl VoxelGrid {
    pub fn filled(v: Voxel) -> Self {
        Self {
            voxels: vec![v; CHUNK_VOLUME].into_boxed_slice(),
        }
    }

    pub fn air() -> Self {
        Self::filled(Voxel::AIR)
    }

    /// Builds from a linear buffer, padding or truncating to the chunk volume.
    pub fn from_voxels(mut voxels: Vec<Voxel>) -> Self {
        voxels.resize(CHUNK_VOLUME, Voxel::AIR);
        Self {
            voxels: voxels.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Voxel {
        self.voxels[voxel_index(x, y, z)]
    }

    #[inline]
    pub fn at(&self, idx: usize) -> Voxel {
        self.voxels[idx]
    }

    #[inline]
    pub fn at_mut(&mut self, idx: usize) -> &mut Voxel {
        &mut self.voxels[idx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, v: Voxel) {
        self.voxels[voxel_index(x, y, z)] = v;
    }

    /// Signed local lookup; `None` outside `0..CHUNK_SIZE` on any axis.
    #[inline]
    pub fn get_i(&self, x: i32, y: i32, z: i32) -> Option<Voxel> {
        let s = CHUNK_SIZE as i32;
        if x < 0 || y < 0 || z < 0 || x >= s || y >= s || z >= s {
            return None;
        }
        Some(self.get(x as usize, y as usize, z as usize))
    }

    #[inline]
    pub fn as_slice(&self) -> &[Voxel] {
        &self.voxels
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    pub fn has_content(&self) -> bool {
        self.voxels.iter().any(|v| v.has_content())
    }

    pub fn clear_light(&mut self) {
        for v in self.voxels.iter_mut() {
            v.clear_light();
        }
    }

    pub fn fill_light(&mut self, sun: u8, torch: u8) {
        for v in self.voxels.iter_mut() {
            v.set_sun(sun);
            v.set_torch(torch);
        }
    }

    /// Order-sensitive checksum of material, tint, shape and water bits.
    /// Light is excluded so relighting never looks like a geometry change.
    pub fn content_signature(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for v in self.voxels.iter() {
            let mut unlit = *v;
            unlit.clear_light();
            let [r, g, b] = unlit.tint();
            let word = u64::from(unlit.material().0)
                | (u64::from(unlit.opacity()) << 16)
                | (u64::from(unlit.water()) << 20)
                | (u64::from(unlit.rotation()) << 24)
                | (u64::from(r) << 32)
                | (u64::from(g) << 40)
                | (u64::from(b) << 48);
            h = (h ^ word).wrapping_mul(0x0000_0100_0000_01b3);
        }
        h
    }
}

/// Shared stand-in grids for neighbours that are absent or known empty.
#[derive(Clone, Debug)]
pub struct Placeholders {
    pub sky: Arc<VoxelGrid>,
    pub dark: Arc<VoxelGrid>,
    pub solid: Arc<VoxelGrid>,
}

impl Placeholders {
    pub fn new(solid: Voxel) -> Self {
        Self {
            sky: Arc::new(VoxelGrid::filled(Voxel::SKY)),
            dark: Arc::new(VoxelGrid::air()),
            solid: Arc::new(VoxelGrid::filled(solid)),
        }
    }

    /// Air placeholder lit according to whether it sits above the surface.
    #[inline]
    pub fn empty(&self, above_surface: bool) -> &Arc<VoxelGrid> {
        if above_surface { &self.sky } else { &self.dark }
    }

    /// Stand-in for a neighbour that has not been created yet.
    #[inline]
    pub fn missing(&self, center_above_surface: bool) -> &Arc<VoxelGrid> {
        if center_above_surface { &self.sky } else { &self.solid }
    }
}
