use serde::{Deserialize, Serialize};

use crate::{CHUNK_SIZE, Face};

/// Chunk coordinates must satisfy `|c| < KEY_ENVELOPE` on every axis to be
/// addressable by [`ChunkCoord::key`].
pub const KEY_ENVELOPE: i32 = 1 << 20;
const KEY_BITS: u32 = 21;
const KEY_MASK: u64 = (1 << KEY_BITS) - 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cy: i32,
    pub cz: i32,
}

impl ChunkCoord {
    #[inline]
    pub const fn new(cx: i32, cy: i32, cz: i32) -> Self {
        Self { cx, cy, cz }
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            cx: self.cx + dx,
            cy: self.cy + dy,
            cz: self.cz + dz,
        }
    }

    #[inline]
    pub fn neighbor(self, face: Face) -> Self {
        let (dx, dy, dz) = face.delta();
        self.offset(dx, dy, dz)
    }

    #[inline]
    pub fn distance_sq(self, other: ChunkCoord) -> i64 {
        let dx = i64::from(self.cx - other.cx);
        let dy = i64::from(self.cy - other.cy);
        let dz = i64::from(self.cz - other.cz);
        dx * dx + dy * dy + dz * dz
    }

    #[inline]
    pub fn distance_xz_sq(self, other: ChunkCoord) -> i64 {
        let dx = i64::from(self.cx - other.cx);
        let dz = i64::from(self.cz - other.cz);
        dx * dx + dz * dz
    }

    /// True when `other` is inside the box of half-extents `xz`/`y` around self.
    #[inline]
    pub fn within_view(self, other: ChunkCoord, xz: i32, y: i32) -> bool {
        (self.cx - other.cx).abs() <= xz
            && (self.cz - other.cz).abs() <= xz
            && (self.cy - other.cy).abs() <= y
    }

    /// Chunk containing a world voxel position.
    #[inline]
    pub fn from_world(wx: i32, wy: i32, wz: i32) -> Self {
        let s = CHUNK_SIZE as i32;
        Self::new(wx.div_euclid(s), wy.div_euclid(s), wz.div_euclid(s))
    }

    /// Chunk containing a world-space point.
    #[inline]
    pub fn from_point(x: f32, y: f32, z: f32) -> Self {
        Self::from_world(x.floor() as i32, y.floor() as i32, z.floor() as i32)
    }

    /// World position of the chunk's minimum voxel.
    #[inline]
    pub fn origin(self) -> (i32, i32, i32) {
        let s = CHUNK_SIZE as i32;
        (self.cx * s, self.cy * s, self.cz * s)
    }

    /// Collision-free 63-bit key, `None` outside the addressable envelope.
    #[inline]
    pub fn key(self) -> Option<u64> {
        let inside = |v: i32| v > -KEY_ENVELOPE && v < KEY_ENVELOPE;
        if !(inside(self.cx) && inside(self.cy) && inside(self.cz)) {
            return None;
        }
        let enc = |v: i32| ((v + KEY_ENVELOPE) as u64) & KEY_MASK;
        Some(enc(self.cx) | (enc(self.cy) << KEY_BITS) | (enc(self.cz) << (2 * KEY_BITS)))
    }
}

impl From<(i32, i32, i32)> for ChunkCoord {
    fn from(value: (i32, i32, i32)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

impl From<ChunkCoord> for (i32, i32, i32) {
    fn from(value: ChunkCoord) -> Self {
        (value.cx, value.cy, value.cz)
    }
}

/// Optional finite-world limits in chunk coordinates (inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct WorldBounds {
    pub min: ChunkCoord,
    pub max: ChunkCoord,
}

impl WorldBounds {
    #[inline]
    pub fn contains(&self, c: ChunkCoord) -> bool {
        c.cx >= self.min.cx
            && c.cy >= self.min.cy
            && c.cz >= self.min.cz
            && c.cx <= self.max.cx
            && c.cy <= self.max.cy
            && c.cz <= self.max.cz
    }
}
