//! Read-only voxel lookups against the directory: point queries and ray casts.

use tessel_blocks::Voxel;
use tessel_chunk::{ChunkArena, ChunkDirectory, Population};
use tessel_geom::Vec3;
use tessel_world::{CHUNK_SIZE, ChunkCoord, ChunkId, voxel_index};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoxelHit {
    pub chunk: ChunkId,
    pub coord: ChunkCoord,
    pub index: usize,
    pub voxel: Voxel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayHit {
    pub block: [i32; 3],
    /// Last empty cell before the hit; where a placed voxel would go.
    pub previous: [i32; 3],
    pub normal: [i32; 3],
}

/// Splits a world voxel position into its chunk and the local voxel index.
#[inline]
pub fn locate(wx: i32, wy: i32, wz: i32) -> (ChunkCoord, usize) {
    let s = CHUNK_SIZE as i32;
    let coord = ChunkCoord::from_world(wx, wy, wz);
    let idx = voxel_index(
        wx.rem_euclid(s) as usize,
        wy.rem_euclid(s) as usize,
        wz.rem_euclid(s) as usize,
    );
    (coord, idx)
}

/// Voxel at a world position, or `None` if its chunk is not loaded.
/// Known-empty chunks answer with air.
pub fn voxel_at(dir: &ChunkDirectory, arena: &ChunkArena, wx: i32, wy: i32, wz: i32) -> Option<VoxelHit> {
    let (coord, index) = locate(wx, wy, wz);
    let id = dir.lookup(coord)?;
    let c = arena.try_get(id)?;
    let voxel = match (c.population, c.voxels.as_ref()) {
        (Population::Populated, Some(g)) => g.at(index),
        (Population::Unloaded, _) => return None,
        _ => Voxel::AIR,
    };
    Some(VoxelHit {
        chunk: id,
        coord,
        index,
        voxel,
    })
}

#[inline]
fn inv_or_max(v: f32) -> f32 {
    if v.abs() < 1e-8 { f32::MAX } else { 1.0 / v.abs() }
}

/// Walks voxel cells along a ray (3D DDA) until `is_solid` accepts one or
/// `max_dist` is exceeded.
pub fn raycast(origin: Vec3, dir: Vec3, max_dist: f32, mut is_solid: impl FnMut(i32, i32, i32) -> bool) -> Option<RayHit> {
    let len = dir.length();
    if len < 1e-6 {
        return None;
    }
    let d = dir / len;

    let mut v = [origin.x.floor() as i32, origin.y.floor() as i32, origin.z.floor() as i32];
    let o = [origin.x, origin.y, origin.z];
    let dv = [d.x, d.y, d.z];
    let mut step = [0i32; 3];
    let mut t_delta = [f32::MAX; 3];
    let mut t_max = [f32::MAX; 3];
    for a in 0..3 {
        let inv = inv_or_max(dv[a]);
        let frac = o[a] - o[a].floor();
        if dv[a] > 0.0 {
            step[a] = 1;
            t_delta[a] = inv;
            t_max[a] = (1.0 - frac) * inv;
        } else if dv[a] < 0.0 {
            step[a] = -1;
            t_delta[a] = inv;
            t_max[a] = frac * inv;
        }
    }

    let mut prev = v;
    let mut t = 0.0f32;
    let max_steps = (max_dist.max(0.0) * 3.0) as usize + 3;
    for _ in 0..max_steps {
        if t > max_dist {
            break;
        }
        if is_solid(v[0], v[1], v[2]) {
            let mut normal = [0i32; 3];
            for a in 0..3 {
                normal[a] = prev[a] - v[a];
            }
            return Some(RayHit {
                block: v,
                previous: prev,
                normal,
            });
        }
        prev = v;
        let a = if t_max[0] < t_max[1] {
            if t_max[0] < t_max[2] { 0 } else { 2 }
        } else if t_max[1] < t_max[2] {
            1
        } else {
            2
        };
        v[a] += step[a];
        t = t_max[a];
        t_max[a] += t_delta[a];
    }
    None
}
