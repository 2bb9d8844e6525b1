//! Fixed-capacity chunk pool.
//!
//! Records are created in batches up to `capacity` and never freed; once the
//! pool is full a cyclic reuse scan picks a live record to repurpose.

use log::debug;
use tessel_world::{ChunkCoord, ChunkId};

use crate::chunk::Chunk;

#[derive(Clone, Copy, Debug)]
pub struct ArenaConfig {
    pub capacity: usize,
    pub grow_batch: usize,
    /// Minimum Euclidean distance, in chunks, between a reused record and its new target.
    pub reuse_margin: i32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            grow_batch: 64,
            reuse_margin: 2,
        }
    }
}

/// Where a reuse candidate must not be.
#[derive(Clone, Copy, Debug)]
pub struct ReuseQuery {
    pub target: ChunkCoord,
    pub observer: ChunkCoord,
    pub view_xz: i32,
    pub view_y: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    /// Unassigned record from the free list.
    Fresh(ChunkId),
    /// Live record evicted from `previous`; the caller detaches it before reassigning.
    Reused {
        id: ChunkId,
        previous: ChunkCoord,
        fallback: bool,
    },
    /// Every live record is modified, pinned, visible or vetoed.
    Exhausted,
}

pub struct ChunkArena {
    chunks: Vec<Chunk>,
    free: Vec<ChunkId>,
    live: usize,
    cfg: ArenaConfig,
    reuse_cursor: usize,
    pinned_prefix: usize,
}

impl ChunkArena {
    pub fn new(cfg: ArenaConfig) -> Self {
        let capacity = cfg.capacity.max(1);
        Self {
            chunks: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            live: 0,
            cfg: ArenaConfig {
                capacity,
                grow_batch: cfg.grow_batch.max(1),
                ..cfg
            },
            reuse_cursor: 0,
            pinned_prefix: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cfg.capacity
    }

    /// Records created so far (live or free).
    #[inline]
    pub fn allocated(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn get(&self, id: ChunkId) -> &Chunk {
        &self.chunks[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ChunkId) -> &mut Chunk {
        &mut self.chunks[id.index()]
    }

    #[inline]
    pub fn try_get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn iter_live(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.is_live())
    }

    /// Two records borrowed at once; `None` if `a == b`.
    pub fn pair_mut(&mut self, a: ChunkId, b: ChunkId) -> Option<(&mut Chunk, &mut Chunk)> {
        let (ia, ib) = (a.index(), b.index());
        if ia == ib {
            return None;
        }
        if ia < ib {
            let (lo, hi) = self.chunks.split_at_mut(ib);
            Some((&mut lo[ia], &mut hi[0]))
        } else {
            let (lo, hi) = self.chunks.split_at_mut(ia);
            Some((&mut hi[0], &mut lo[ib]))
        }
    }

    fn grow(&mut self) -> usize {
        let room = self.cfg.capacity - self.chunks.len();
        let n = room.min(self.cfg.grow_batch);
        for _ in 0..n {
            let id = ChunkId(self.chunks.len() as u32);
            self.chunks.push(Chunk::unloaded(id));
            self.free.push(id);
        }
        // Hand out low ids first.
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        if n > 0 {
            debug!("chunk arena grew by {} to {}", n, self.chunks.len());
        }
        n
    }

    /// Picks a record for `query.target`: a free one, a newly grown one, or a
    /// reused live one. `veto` may refuse reuse candidates.
    pub fn acquire(&mut self, query: &ReuseQuery, mut veto: impl FnMut(&Chunk) -> bool) -> Acquired {
        if self.free.is_empty() {
            self.grow();
        }
        if let Some(id) = self.free.pop() {
            return Acquired::Fresh(id);
        }
        self.reuse_scan(query, &mut veto)
    }

    /// True when `acquire` would hand out a record. Moves no cursor, so a
    /// caller can check before doing expensive work for the target.
    pub fn can_acquire(&self, query: &ReuseQuery, mut veto: impl FnMut(&Chunk) -> bool) -> bool {
        !self.free.is_empty() || self.chunks.len() < self.cfg.capacity || self.find_reuse(query, &mut veto).is_some()
    }

    fn reuse_scan(&mut self, q: &ReuseQuery, veto: &mut dyn FnMut(&Chunk) -> bool) -> Acquired {
        match self.find_reuse(q, veto) {
            Some((i, fallback)) => {
                self.reuse_cursor = i + 1;
                let c = &self.chunks[i];
                Acquired::Reused {
                    id: c.id,
                    previous: c.coord,
                    fallback,
                }
            }
            None => Acquired::Exhausted,
        }
    }

    /// Index of the record the reuse scan would take, and whether it is a
    /// fallback inside the reuse margin.
    fn find_reuse(&self, q: &ReuseQuery, veto: &mut dyn FnMut(&Chunk) -> bool) -> Option<(usize, bool)> {
        let len = self.chunks.len();
        let start_at = self.pinned_prefix.min(len);
        let span = len - start_at;
        if span == 0 {
            return None;
        }
        let margin_sq = i64::from(self.cfg.reuse_margin) * i64::from(self.cfg.reuse_margin);
        let mut cursor = self.reuse_cursor.max(start_at);
        let mut fallback: Option<usize> = None;
        for _ in 0..span {
            if cursor >= len {
                cursor = start_at;
            }
            let i = cursor;
            cursor += 1;
            let c = &self.chunks[i];
            if !c.is_live() || c.modified || c.pinned {
                continue;
            }
            if q.observer.within_view(c.coord, q.view_xz, q.view_y) {
                continue;
            }
            if !veto(c) {
                continue;
            }
            if c.coord.distance_sq(q.target) <= margin_sq {
                if fallback.is_none() {
                    fallback = Some(i);
                }
                continue;
            }
            return Some((i, false));
        }
        fallback.map(|i| (i, true))
    }

    /// Binds a record to `coord`, resetting all per-chunk state.
    /// The record must already be detached from the directory.
    pub fn assign(&mut self, id: ChunkId, coord: ChunkCoord) -> &mut Chunk {
        let c = &mut self.chunks[id.index()];
        if !c.is_live() {
            self.live += 1;
        }
        c.reset(coord);
        // Placeholder until the caller marks it Empty or Populated.
        c.population = crate::chunk::Population::Empty;
        c
    }

    /// Returns a live record to the free list.
    pub fn release(&mut self, id: ChunkId) {
        let c = &mut self.chunks[id.index()];
        if !c.is_live() {
            return;
        }
        let coord = c.coord;
        c.reset(coord);
        self.live -= 1;
        self.free.push(id);
    }

    pub fn set_pinned(&mut self, id: ChunkId, pinned: bool) {
        self.chunks[id.index()].pinned = pinned;
        self.recompute_pinned_prefix();
    }

    /// Length of the leading run of pinned records the reuse scan can skip.
    pub fn recompute_pinned_prefix(&mut self) {
        self.pinned_prefix = self.chunks.iter().take_while(|c| c.pinned).count();
        if self.reuse_cursor < self.pinned_prefix {
            self.reuse_cursor = self.pinned_prefix;
        }
    }

    #[inline]
    pub fn pinned_prefix(&self) -> usize {
        self.pinned_prefix
    }

    /// Releases everything; records stay allocated.
    pub fn reset_all(&mut self) {
        let ids: Vec<ChunkId> = self.chunks.iter().filter(|c| c.is_live()).map(|c| c.id).collect();
        for id in ids {
            self.release(id);
        }
        for c in self.chunks.iter_mut() {
            c.pinned = false;
        }
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        self.reuse_cursor = 0;
        self.recompute_pinned_prefix();
    }
}
