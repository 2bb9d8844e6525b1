//! Fixed-capacity FIFO of voxel indices used by the flood fill.

use tessel_world::CHUNK_VOLUME;

/// Worst case: every voxel re-enqueued through each face plus a few seeds.
pub const QUEUE_CAPACITY: usize = CHUNK_VOLUME * 9;

/// Entry flag marking a point-light seed; the seed ignores its own opacity.
pub const SOURCE_FLAG: u32 = 1 << 31;
pub const INDEX_MASK: u32 = SOURCE_FLAG - 1;

/// Ring buffer with one twist: [`LightQueue::push_front_reuse`] writes into
/// the slot that was just popped, so that entry is processed next.
pub struct LightQueue {
    slots: Box<[u32]>,
    head: usize,
    tail: usize,
    reusable: bool,
}

impl Default for LightQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LightQueue {
    pub fn new() -> Self {
        Self {
            slots: vec![0; QUEUE_CAPACITY].into_boxed_slice(),
            head: 0,
            tail: 0,
            reusable: false,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.reusable = false;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Appends at the tail; false when full.
    #[inline]
    pub fn push(&mut self, entry: u32) -> bool {
        if self.len() >= self.slots.len() {
            return false;
        }
        let cap = self.slots.len();
        self.slots[self.tail % cap] = entry;
        self.tail += 1;
        true
    }

    #[inline]
    pub fn pop(&mut self) -> Option<u32> {
        if self.is_empty() {
            self.reusable = false;
            return None;
        }
        let cap = self.slots.len();
        let e = self.slots[self.head % cap];
        self.head += 1;
        self.reusable = true;
        Some(e)
    }

    /// Overwrites the slot consumed by the last `pop`, making `entry` the
    /// next one out. Falls back to `push` if there was no such slot.
    #[inline]
    pub fn push_front_reuse(&mut self, entry: u32) -> bool {
        if !self.reusable {
            return self.push(entry);
        }
        self.reusable = false;
        self.head -= 1;
        let cap = self.slots.len();
        self.slots[self.head % cap] = entry;
        true
    }
}
