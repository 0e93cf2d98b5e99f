//! Forced-PvP zones: axis-aligned block cuboids that switch PvP on for
//! anyone inside.
//!
//! Zones are created from a two-point operator [`Selection`] and never
//! move or resize afterwards. [`ZoneSet`] owns every zone plus the
//! [`MembershipCache`] that fronts containment queries; any change to the
//! set clears the cache wholesale.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::MembershipCache;
use crate::identity::BlockPos;

/// One corner of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Corner {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Corner {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl From<&BlockPos> for Corner {
    fn from(pos: &BlockPos) -> Self {
        Self::new(pos.x, pos.y, pos.z)
    }
}

/// A named cuboid in one world. `min <= max` on every axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    name: String,
    world: String,
    min: Corner,
    max: Corner,
}

impl Zone {
    /// Build a zone from two opposite corners given in any order.
    pub fn new(name: impl Into<String>, world: impl Into<String>, a: Corner, b: Corner) -> Self {
        Self {
            name: name.into(),
            world: world.into(),
            min: Corner::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Corner::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive lookup key.
    pub fn key(&self) -> String {
        zone_key(&self.name)
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn min(&self) -> Corner {
        self.min
    }

    pub fn max(&self) -> Corner {
        self.max
    }

    /// Inclusive on all six faces.
    pub fn contains(&self, pos: &BlockPos) -> bool {
        pos.world == self.world
            && (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    /// Number of blocks covered. Each span can reach 2^32, so the
    /// product needs 128 bits.
    pub fn volume(&self) -> u128 {
        let span = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo) + 1) as u128;
        span(self.min.x, self.max.x) * span(self.min.y, self.max.y) * span(self.min.z, self.max.z)
    }
}

/// Normalized key used for zone uniqueness and lookup.
pub fn zone_key(name: &str) -> String {
    name.to_lowercase()
}

/// Which of the two selection points an operator is setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSlot {
    First,
    Second,
}

/// An operator's two pending zone corners. Slots are overwritten in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    points: [Option<BlockPos>; 2],
}

impl Selection {
    pub fn set(&mut self, slot: SelectionSlot, pos: BlockPos) {
        let index = match slot {
            SelectionSlot::First => 0,
            SelectionSlot::Second => 1,
        };
        self.points[index] = Some(pos);
    }

    pub fn get(&self, slot: SelectionSlot) -> Option<&BlockPos> {
        match slot {
            SelectionSlot::First => self.points[0].as_ref(),
            SelectionSlot::Second => self.points[1].as_ref(),
        }
    }

    /// Both corners, provided they are set and share a world.
    pub fn corners(&self) -> Result<(&BlockPos, &BlockPos), ZoneError> {
        let (Some(a), Some(b)) = (&self.points[0], &self.points[1]) else {
            return Err(ZoneError::IncompleteSelection);
        };
        if a.world != b.world {
            return Err(ZoneError::CrossWorld {
                first: a.world.clone(),
                second: b.world.clone(),
            });
        }
        Ok((a, b))
    }
}

/// Why a zone could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("both selection points must be set")]
    IncompleteSelection,
    #[error("selection spans two worlds ({first} and {second})")]
    CrossWorld { first: String, second: String },
    #[error("a zone named '{0}' already exists")]
    AlreadyExists(String),
}

/// Movement across a zone boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTransition {
    Entered,
    Left,
}

/// All zones plus the membership cache in front of them.
#[derive(Debug, Clone)]
pub struct ZoneSet {
    /// Creation order.
    zones: Vec<Zone>,
    cache: MembershipCache,
}

impl ZoneSet {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            zones: Vec::new(),
            cache: MembershipCache::new(cache_capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn get(&self, name: &str) -> Option<&Zone> {
        let key = zone_key(name);
        self.zones.iter().find(|z| z.key() == key)
    }

    pub fn insert(&mut self, zone: Zone) -> Result<(), ZoneError> {
        if self.get(zone.name()).is_some() {
            return Err(ZoneError::AlreadyExists(zone.name().to_string()));
        }
        self.zones.push(zone);
        self.cache.clear();
        Ok(())
    }

    /// Create a zone from an operator's selection.
    pub fn create_from_selection(
        &mut self,
        name: &str,
        selection: &Selection,
    ) -> Result<Zone, ZoneError> {
        let (a, b) = selection.corners()?;
        let zone = Zone::new(name, a.world.clone(), a.into(), b.into());
        self.insert(zone.clone())?;
        Ok(zone)
    }

    pub fn remove(&mut self, name: &str) -> Option<Zone> {
        let key = zone_key(name);
        let index = self.zones.iter().position(|z| z.key() == key)?;
        let removed = self.zones.remove(index);
        self.cache.clear();
        Some(removed)
    }

    /// Swap in a whole zone set (used when loading). Later duplicates of a
    /// key are dropped and returned.
    pub fn replace_all(&mut self, zones: impl IntoIterator<Item = Zone>) -> Vec<Zone> {
        self.zones.clear();
        self.cache.clear();
        let mut rejected = Vec::new();
        for zone in zones {
            if self.get(zone.name()).is_some() {
                rejected.push(zone);
            } else {
                self.zones.push(zone);
            }
        }
        rejected
    }

    /// Cached containment query.
    pub fn contains(&mut self, pos: &BlockPos) -> bool {
        if let Some(inside) = self.cache.get(pos) {
            return inside;
        }
        let inside = self.scan(pos);
        self.cache.insert(pos.clone(), inside);
        inside
    }

    /// Uncached linear scan over every zone.
    pub fn scan(&self, pos: &BlockPos) -> bool {
        self.zones.iter().any(|z| z.contains(pos))
    }

    /// Names of every zone containing `pos`.
    pub fn zones_at(&self, pos: &BlockPos) -> Vec<&str> {
        self.zones
            .iter()
            .filter(|z| z.contains(pos))
            .map(Zone::name)
            .collect()
    }

    /// Whether moving `from` → `to` crosses into or out of forced territory.
    /// Moves within one block never count.
    pub fn transition(&mut self, from: &BlockPos, to: &BlockPos) -> Option<ZoneTransition> {
        if from.same_block(to) {
            return None;
        }
        match (self.contains(from), self.contains(to)) {
            (false, true) => Some(ZoneTransition::Entered),
            (true, false) => Some(ZoneTransition::Left),
            _ => None,
        }
    }

    pub fn cache(&self) -> &MembershipCache {
        &self.cache
    }
}
