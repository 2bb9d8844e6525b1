//! World coordinates, chunk sizing, and the terrain collaborators the
//! streamer calls into.
#![forbid(unsafe_code)]

mod chunk_coord;
mod face;
pub mod terrain;

pub use chunk_coord::{ChunkCoord, KEY_ENVELOPE, WorldBounds};
pub use face::Face;
pub use terrain::{
    ColumnSample, DetailGenerator, FillReport, FlatTerrain, HeightQuery, NoDetails, NoiseTerrain,
    TerrainFill, TerrainParams,
};

pub const CHUNK_SIZE: usize = 16;
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

/// Linear index of a local voxel position inside a chunk.
#[inline]
pub const fn voxel_index(x: usize, y: usize, z: usize) -> usize {
    (y * CHUNK_SIZE + z) * CHUNK_SIZE + x
}

/// Inverse of [`voxel_index`].
#[inline]
pub const fn voxel_position(idx: usize) -> (usize, usize, usize) {
    let x = idx % CHUNK_SIZE;
    let z = (idx / CHUNK_SIZE) % CHUNK_SIZE;
    let y = idx / (CHUNK_SIZE * CHUNK_SIZE);
    (x, y, z)
}

/// Stable handle to a chunk record in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub u32);

impl ChunkId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a node in the visibility octree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrips_corners() {
        let last = CHUNK_SIZE - 1;
        for &(x, y, z) in &[(0, 0, 0), (last, 0, 0), (0, last, 0), (0, 0, last), (last, last, last)] {
            assert_eq!(voxel_position(voxel_index(x, y, z)), (x, y, z));
        }
        assert_eq!(voxel_index(1, 0, 0), 1);
        assert_eq!(voxel_index(0, 0, 1), CHUNK_SIZE);
        assert_eq!(voxel_index(0, 1, 0), CHUNK_SIZE * CHUNK_SIZE);
    }
}
