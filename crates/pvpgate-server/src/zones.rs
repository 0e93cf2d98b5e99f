//! Shared zone index: the zone set and its cache behind one lock, plus the
//! operators' pending selections.

use std::collections::HashMap;
use std::sync::Mutex;

use pvpgate_logic::identity::{BlockPos, ParticipantId};
use pvpgate_logic::zone::{Selection, SelectionSlot, Zone, ZoneError, ZoneSet, ZoneTransition};

use crate::lock;

#[derive(Debug)]
pub struct ZoneIndex {
    set: Mutex<ZoneSet>,
    selections: Mutex<HashMap<ParticipantId, Selection>>,
}

impl ZoneIndex {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            set: Mutex::new(ZoneSet::new(cache_capacity)),
            selections: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, pos: &BlockPos) -> bool {
        lock(&self.set).contains(pos)
    }

    /// Uncached linear check.
    pub fn scan(&self, pos: &BlockPos) -> bool {
        lock(&self.set).scan(pos)
    }

    /// Names of every zone covering `pos`, in creation order.
    pub fn zones_at(&self, pos: &BlockPos) -> Vec<String> {
        lock(&self.set)
            .zones_at(pos)
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    pub fn transition(&self, from: &BlockPos, to: &BlockPos) -> Option<ZoneTransition> {
        lock(&self.set).transition(from, to)
    }

    pub fn set_selection_point(&self, operator: ParticipantId, slot: SelectionSlot, pos: BlockPos) {
        lock(&self.selections)
            .entry(operator)
            .or_default()
            .set(slot, pos);
    }

    pub fn selection(&self, operator: ParticipantId) -> Option<Selection> {
        lock(&self.selections).get(&operator).cloned()
    }

    /// Create `name` from the operator's current selection.
    pub fn create(&self, name: &str, operator: ParticipantId) -> Result<Zone, ZoneError> {
        let selection = self.selection(operator).unwrap_or_default();
        lock(&self.set).create_from_selection(name, &selection)
    }

    pub fn insert(&self, zone: Zone) -> Result<(), ZoneError> {
        lock(&self.set).insert(zone)
    }

    pub fn delete(&self, name: &str) -> Option<Zone> {
        lock(&self.set).remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Zone> {
        lock(&self.set).get(name).cloned()
    }

    /// Every zone, in creation order.
    pub fn list(&self) -> Vec<Zone> {
        lock(&self.set).zones().to_vec()
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.set)
            .zones()
            .iter()
            .map(|z| z.name().to_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.set).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace every zone; returns the ones rejected as duplicates.
    pub fn replace_all(&self, zones: Vec<Zone>) -> Vec<Zone> {
        lock(&self.set).replace_all(zones)
    }

    /// Cache (hits, misses).
    pub fn cache_stats(&self) -> (u64, u64) {
        lock(&self.set).cache().stats()
    }
}
