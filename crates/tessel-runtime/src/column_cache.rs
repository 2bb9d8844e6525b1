use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tessel_world::{ColumnSample, HeightQuery};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColumnCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    x: i32,
    z: i32,
    sample: ColumnSample,
}

/// Direct-mapped cache of height/biome samples keyed by world column.
/// A colliding column simply replaces the previous occupant.
pub struct ColumnCache {
    slots: Vec<Mutex<Option<Entry>>>,
    mask: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ColumnCache {
    /// `capacity` is rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let n = capacity.max(1).next_power_of_two();
        Self {
            slots: (0..n).map(|_| Mutex::new(None)).collect(),
            mask: n - 1,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot(&self, x: i32, z: i32) -> MutexGuard<'_, Option<Entry>> {
        let h = (x as u32 as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ (z as u32 as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f);
        let i = ((h >> 32) as usize) & self.mask;
        self.slots[i].lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, x: i32, z: i32) -> Option<ColumnSample> {
        let slot = self.slot(x, z);
        match *slot {
            Some(e) if e.x == x && e.z == z => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(e.sample)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, x: i32, z: i32, sample: ColumnSample) {
        let mut slot = self.slot(x, z);
        if slot.is_some_and(|e| e.x != x || e.z != z) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        *slot = Some(Entry { x, z, sample });
    }

    /// Cached sample for the column, asking `query` on a miss.
    pub fn sample(&self, query: &dyn HeightQuery, x: i32, z: i32) -> ColumnSample {
        if let Some(s) = self.get(x, z) {
            return s;
        }
        let s = query.sample(x, z);
        self.insert(x, z, s);
        s
    }

    pub fn clear(&self) {
        let mut removed = 0;
        for slot in &self.slots {
            let mut s = slot.lock().unwrap_or_else(|e| e.into_inner());
            if s.take().is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.evictions.fetch_add(removed, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> ColumnCacheStats {
        let entries = self
            .slots
            .iter()
            .filter(|s| s.lock().map(|g| g.is_some()).unwrap_or(false))
            .count();
        ColumnCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct Counting(AtomicUsize);

    impl HeightQuery for Counting {
        fn sample(&self, x: i32, z: i32) -> ColumnSample {
            self.0.fetch_add(1, Ordering::Relaxed);
            ColumnSample {
                ground: x + z,
                moisture: 0.0,
                biome: 1,
            }
        }
    }

    #[test]
    fn repeated_column_hits_cache() {
        let q = Counting(AtomicUsize::new(0));
        let c = ColumnCache::new(64);
        assert_eq!(c.sample(&q, 3, 4).ground, 7);
        assert_eq!(c.sample(&q, 3, 4).ground, 7);
        assert_eq!(q.0.load(Ordering::Relaxed), 1);
        let s = c.stats();
        assert_eq!((s.hits, s.misses, s.entries), (1, 1, 1));
    }

    #[test]
    fn single_slot_evicts_on_collision() {
        let q = Counting(AtomicUsize::new(0));
        let c = ColumnCache::new(1);
        c.sample(&q, 0, 0);
        c.sample(&q, 1, 0);
        c.sample(&q, 0, 0);
        assert_eq!(q.0.load(Ordering::Relaxed), 3);
        assert_eq!(c.stats().evictions, 2);
        c.clear();
        let s = c.stats();
        assert_eq!(s.entries, 0);
        assert_eq!(s.evictions, 3);
    }
}
