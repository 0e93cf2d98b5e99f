//! Bounded least-recently-used cache of zone membership answers.
//!
//! Keyed by block position. Lookups refresh recency; inserting past
//! capacity evicts the stalest entry. The cache holds no knowledge of
//! zones, so its owner must [`MembershipCache::clear`] it whenever the zone
//! set changes.

use std::collections::{BTreeMap, HashMap};

use crate::identity::BlockPos;

#[derive(Debug, Clone)]
pub struct MembershipCache {
    capacity: usize,
    clock: u64,
    entries: HashMap<BlockPos, Slot>,
    /// Recency stamp → key, oldest first.
    recency: BTreeMap<u64, BlockPos>,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    inside: bool,
    stamp: u64,
}

impl MembershipCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached answer for `pos`, refreshing its recency. `None` is a miss.
    pub fn get(&mut self, pos: &BlockPos) -> Option<bool> {
        let stamp = self.next_stamp();
        match self.entries.get_mut(pos) {
            Some(slot) => {
                self.recency.remove(&slot.stamp);
                slot.stamp = stamp;
                self.recency.insert(stamp, pos.clone());
                self.hits += 1;
                Some(slot.inside)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, pos: BlockPos, inside: bool) {
        let stamp = self.next_stamp();
        if let Some(slot) = self.entries.get_mut(&pos) {
            self.recency.remove(&slot.stamp);
            *slot = Slot { inside, stamp };
            self.recency.insert(stamp, pos);
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some((_, oldest)) = self.recency.pop_first() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(pos.clone(), Slot { inside, stamp });
        self.recency.insert(stamp, pos);
    }

    /// Drop every entry. Hit/miss counters survive.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    /// (hits, misses) since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
