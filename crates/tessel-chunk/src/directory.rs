//! Coordinate → chunk map with a one-entry lookup cache.

use std::sync::{Mutex, MutexGuard};

use hashbrown::HashMap;
use tessel_world::{ChunkCoord, ChunkId, Face, NodeId};

use crate::arena::ChunkArena;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub chunk: Option<ChunkId>,
    /// Octree leaf that discovered this coordinate.
    pub leaf: Option<NodeId>,
}

#[derive(Clone, Copy, Debug)]
struct LastFetch {
    key: u64,
    chunk: Option<ChunkId>,
}

/// Structural writes happen on the main thread; `lookup` may be called from
/// query threads and only touches the cache lock.
pub struct ChunkDirectory {
    map: HashMap<u64, DirEntry>,
    last: Mutex<Option<LastFetch>>,
    chunks: usize,
}

impl Default for ChunkDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDirectory {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            last: Mutex::new(None),
            chunks: 0,
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<LastFetch>> {
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn lookup(&self, coord: ChunkCoord) -> Option<ChunkId> {
        let key = coord.key()?;
        let mut last = self.cache();
        if let Some(hit) = *last {
            if hit.key == key {
                return hit.chunk;
            }
        }
        let chunk = self.map.get(&key).and_then(|e| e.chunk);
        *last = Some(LastFetch { key, chunk });
        chunk
    }

    pub fn entry(&self, coord: ChunkCoord) -> Option<&DirEntry> {
        self.map.get(&coord.key()?)
    }

    /// Number of coordinates that currently hold a chunk.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Number of entries including leaf-only ones.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn coords_with_chunks(&self) -> impl Iterator<Item = (ChunkCoord, ChunkId)> + '_ {
        self.map.iter().filter_map(|(k, e)| e.chunk.map(|c| (decode(*k), c)))
    }

    fn forget_cached(&self, key: u64) {
        let mut last = self.cache();
        if last.is_some_and(|l| l.key == key) {
            *last = None;
        }
    }

    /// Drops a cached alias that points at `id`, whatever its key.
    pub fn forget_chunk(&self, id: ChunkId) {
        let mut last = self.cache();
        if last.is_some_and(|l| l.chunk == Some(id)) {
            *last = None;
        }
    }

    pub fn set_leaf(&mut self, coord: ChunkCoord, leaf: NodeId) {
        if let Some(key) = coord.key() {
            self.map.entry(key).or_default().leaf = Some(leaf);
        }
    }

    pub fn clear_leaf(&mut self, coord: ChunkCoord) {
        let Some(key) = coord.key() else { return };
        if let Some(e) = self.map.get_mut(&key) {
            e.leaf = None;
            if e.chunk.is_none() {
                self.map.remove(&key);
            }
        }
    }

    /// Registers `id` at `coord` and links it with its existing face neighbours.
    /// Returns false when `coord` is outside the addressable envelope.
    pub fn insert(&mut self, coord: ChunkCoord, id: ChunkId, arena: &mut ChunkArena) -> bool {
        let Some(key) = coord.key() else {
            return false;
        };
        let e = self.map.entry(key).or_default();
        if e.chunk.is_none() {
            self.chunks += 1;
        }
        e.chunk = Some(id);
        self.forget_cached(key);
        for face in Face::ALL {
            let other = coord.neighbor(face);
            let nid = other
                .key()
                .and_then(|k| self.map.get(&k))
                .and_then(|e| e.chunk);
            if let Some(nid) = nid {
                if let Some((me, them)) = arena.pair_mut(id, nid) {
                    me.neighbors[face.index()] = Some(nid);
                    them.neighbors[face.opposite().index()] = Some(id);
                }
            }
        }
        true
    }

    /// Detaches the chunk at `coord`, clearing both sides of every neighbour
    /// link. The entry's leaf reference is returned so the caller can
    /// invalidate the octree.
    pub fn remove(&mut self, coord: ChunkCoord, arena: &mut ChunkArena) -> Option<DirEntry> {
        let key = coord.key()?;
        let entry = self.map.remove(&key)?;
        self.forget_cached(key);
        if let Some(id) = entry.chunk {
            self.chunks -= 1;
            self.forget_chunk(id);
            for face in Face::ALL {
                if let Some(nid) = arena.get(id).neighbors[face.index()] {
                    arena.get_mut(nid).neighbors[face.opposite().index()] = None;
                }
            }
            arena.get_mut(id).neighbors = [None; 6];
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.chunks = 0;
        *self.cache() = None;
    }
}

fn decode(key: u64) -> ChunkCoord {
    const BITS: u32 = 21;
    const MASK: u64 = (1 << BITS) - 1;
    let env = tessel_world::KEY_ENVELOPE;
    let d = |v: u64| (v & MASK) as i32 - env;
    ChunkCoord::new(d(key), d(key >> BITS), d(key >> (2 * BITS)))
}
