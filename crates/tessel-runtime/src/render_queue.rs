//! Chunks waiting for a light/mesh refresh.
//!
//! An intrusive doubly linked list over a fixed ring of slots. Slot 0 is the
//! list sentinel; `slot_of` maps chunk ids to their slot so membership tests
//! and removals are O(1). The ring never grows: when no free slot is found the
//! request is dropped and the caller raises a diagnostic.

use tessel_chunk::{Chunk, ChunkArena};
use tessel_geom::{Aabb, Frustum, Vec3};
use tessel_world::{CHUNK_SIZE, ChunkCoord, ChunkId};

const NIL: u32 = 0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFlags {
    /// Relight from scratch instead of on top of the current light.
    pub clear_light: bool,
    pub needs_mesh: bool,
    pub ignore_frustum: bool,
}

impl QueueFlags {
    pub const REFRESH: QueueFlags = QueueFlags {
        clear_light: true,
        needs_mesh: true,
        ignore_frustum: false,
    };

    pub const MESH: QueueFlags = QueueFlags {
        clear_light: false,
        needs_mesh: true,
        ignore_frustum: false,
    };

    pub const LIGHT: QueueFlags = QueueFlags {
        clear_light: false,
        needs_mesh: false,
        ignore_frustum: false,
    };

    /// Edits: processed even when the chunk is outside the frustum.
    pub const EDIT: QueueFlags = QueueFlags {
        clear_light: true,
        needs_mesh: true,
        ignore_frustum: true,
    };

    #[inline]
    fn merge(&mut self, other: QueueFlags) {
        self.clear_light |= other.clear_light;
        self.needs_mesh |= other.needs_mesh;
        self.ignore_frustum |= other.ignore_frustum;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Added,
    /// Already queued; flags were merged into the existing entry.
    Merged,
    /// No free slot; the request was dropped.
    Exhausted,
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    chunk: Option<ChunkId>,
    flags: QueueFlags,
    prev: u32,
    next: u32,
}

/// Parameters of one `pop_nearest` call. Distances are squared, in chunks.
#[derive(Clone, Copy, Debug)]
pub struct PopQuery<'a> {
    pub observer: ChunkCoord,
    /// `None` disables frustum ranking.
    pub frustum: Option<&'a Frustum>,
    pub frustum_epoch: u64,
    pub accepted_dist_sq: f32,
    pub force_dist_sq: f32,
    pub early_exit_dist_sq: f32,
    pub max_scan: usize,
}

pub struct RenderQueue {
    slots: Vec<Slot>,
    slot_of: Vec<u32>,
    free_cursor: usize,
    len: usize,
}

/// World-space box of the chunk-aligned cuboid at `min` with edge `size` chunks.
pub fn cuboid_aabb(min: ChunkCoord, size: i32) -> Aabb {
    let (x, y, z) = min.origin();
    Aabb::cube(Vec3::new(x as f32, y as f32, z as f32), (size * CHUNK_SIZE as i32) as f32)
}

impl RenderQueue {
    /// `capacity` counts the sentinel, so it holds `capacity - 1` chunks.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            slots: vec![Slot::default(); capacity],
            slot_of: Vec::new(),
            free_cursor: 1,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    #[inline]
    fn slot(&self, id: ChunkId) -> u32 {
        self.slot_of.get(id.index()).copied().unwrap_or(NIL)
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.slot(id) != NIL
    }

    pub fn flags(&self, id: ChunkId) -> Option<QueueFlags> {
        match self.slot(id) {
            NIL => None,
            s => Some(self.slots[s as usize].flags),
        }
    }

    pub fn enqueue(&mut self, chunk: &mut Chunk, flags: QueueFlags) -> EnqueueOutcome {
        let id = chunk.id;
        let existing = self.slot(id);
        if existing != NIL {
            self.slots[existing as usize].flags.merge(flags);
            chunk.in_queue = true;
            return EnqueueOutcome::Merged;
        }
        let Some(s) = self.find_free() else {
            return EnqueueOutcome::Exhausted;
        };
        let head = self.slots[0].next;
        self.slots[s] = Slot {
            chunk: Some(id),
            flags,
            prev: NIL,
            next: head,
        };
        self.slots[head as usize].prev = s as u32;
        self.slots[0].next = s as u32;
        if self.slot_of.len() <= id.index() {
            self.slot_of.resize(id.index() + 1, NIL);
        }
        self.slot_of[id.index()] = s as u32;
        chunk.in_queue = true;
        self.len += 1;
        EnqueueOutcome::Added
    }

    fn find_free(&mut self) -> Option<usize> {
        let n = self.slots.len();
        for step in 0..n - 1 {
            let s = 1 + (self.free_cursor - 1 + step) % (n - 1);
            if self.slots[s].chunk.is_none() {
                self.free_cursor = if s + 1 >= n { 1 } else { s + 1 };
                return Some(s);
            }
        }
        None
    }

    fn unlink(&mut self, s: u32) -> Option<(ChunkId, QueueFlags)> {
        let slot = self.slots[s as usize];
        let id = slot.chunk?;
        self.slots[slot.prev as usize].next = slot.next;
        self.slots[slot.next as usize].prev = slot.prev;
        self.slots[s as usize] = Slot::default();
        self.slot_of[id.index()] = NIL;
        self.len -= 1;
        Some((id, slot.flags))
    }

    /// Drops a chunk from the queue; returns false if it was not queued.
    pub fn remove(&mut self, chunk: &mut Chunk) -> bool {
        chunk.in_queue = false;
        match self.slot(chunk.id) {
            NIL => false,
            s => self.unlink(s).is_some(),
        }
    }

    pub fn clear(&mut self, arena: &mut ChunkArena) {
        while self.slots[0].next != NIL {
            let s = self.slots[0].next;
            if let Some((id, _)) = self.unlink(s) {
                arena.get_mut(id).in_queue = false;
            }
        }
    }

    /// Unlinks and returns the best candidate found within `max_scan` entries.
    ///
    /// Anything within the force distance wins immediately. Otherwise, with
    /// a frustum, chunks outside it rank at four times their distance and
    /// are skipped entirely past the accepted distance.
    pub fn pop_nearest(&mut self, arena: &mut ChunkArena, q: &PopQuery<'_>) -> Option<(ChunkId, QueueFlags)> {
        let mut best: Option<(u32, f32)> = None;
        let mut s = self.slots[0].next;
        let mut scanned = 0;
        while s != NIL && scanned < q.max_scan.max(1) {
            scanned += 1;
            let slot = self.slots[s as usize];
            let next = slot.next;
            let Some(id) = slot.chunk else {
                s = next;
                continue;
            };
            let chunk = arena.get_mut(id);
            let d = chunk.coord.distance_sq(q.observer) as f32;
            if d <= q.force_dist_sq {
                best = Some((s, d));
                break;
            }
            let mut score = d;
            if let Some(frustum) = q.frustum {
                if !slot.flags.ignore_frustum {
                    if chunk.frustum_epoch != q.frustum_epoch {
                        chunk.in_frustum = frustum.intersects_aabb(&cuboid_aabb(chunk.coord, 1));
                        chunk.frustum_epoch = q.frustum_epoch;
                    }
                    if !chunk.in_frustum {
                        if d > q.accepted_dist_sq {
                            s = next;
                            continue;
                        }
                        score = d * 4.0;
                    }
                }
            }
            if best.is_none_or(|(_, b)| score < b) {
                best = Some((s, score));
                if score <= q.early_exit_dist_sq {
                    break;
                }
            }
            s = next;
        }
        let (s, _) = best?;
        let (id, flags) = self.unlink(s)?;
        arena.get_mut(id).in_queue = false;
        Some((id, flags))
    }
}
