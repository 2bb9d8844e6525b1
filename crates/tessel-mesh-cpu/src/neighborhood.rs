use std::sync::Arc;

use tessel_blocks::Voxel;
use tessel_chunk::VoxelGrid;
use tessel_world::CHUNK_SIZE;

/// A chunk plus its 26 surrounding grids, read-only for the lifetime of a job.
#[derive(Clone, Debug)]
pub struct Neighborhood {
    grids: [Arc<VoxelGrid>; 27],
}

impl Neighborhood {
    /// Slot of the grid at chunk offset `(dx, dy, dz)`, each in `-1..=1`.
    #[inline]
    pub const fn slot(dx: i32, dy: i32, dz: i32) -> usize {
        ((dy + 1) * 9 + (dz + 1) * 3 + (dx + 1)) as usize
    }

    pub const CENTER: usize = Self::slot(0, 0, 0);

    pub fn new(grids: [Arc<VoxelGrid>; 27]) -> Self {
        Self { grids }
    }

    /// Center grid surrounded by copies of `around`.
    pub fn isolated(center: Arc<VoxelGrid>, around: Arc<VoxelGrid>) -> Self {
        let mut grids: [Arc<VoxelGrid>; 27] = std::array::from_fn(|_| Arc::clone(&around));
        grids[Self::CENTER] = center;
        Self { grids }
    }

    #[inline]
    pub fn center(&self) -> &VoxelGrid {
        &self.grids[Self::CENTER]
    }

    #[inline]
    pub fn grid(&self, slot: usize) -> &Arc<VoxelGrid> {
        &self.grids[slot]
    }

    /// Voxel at a position relative to the center chunk; valid for each
    /// coordinate in `-CHUNK_SIZE..2 * CHUNK_SIZE`.
    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> Voxel {
        let s = CHUNK_SIZE as i32;
        let (gx, lx) = ((x + s) / s, (x + s) % s);
        let (gy, ly) = ((y + s) / s, (y + s) % s);
        let (gz, lz) = ((z + s) / s, (z + s) % s);
        let slot = (gy * 9 + gz * 3 + gx) as usize;
        self.grids[slot].get(lx as usize, ly as usize, lz as usize)
    }

    #[inline]
    pub fn get_arr(&self, p: [i32; 3]) -> Voxel {
        self.get(p[0], p[1], p[2])
    }
}
