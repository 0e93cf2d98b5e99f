//! Who is connected, where they stand, and who holds the bypass privilege.
//!
//! The host platform implements [`Presence`]; [`PresenceBoard`] is a plain
//! in-memory implementation used by the harness and tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use pvpgate_logic::identity::{BlockPos, ParticipantId};

use crate::lock;

pub trait Presence: Send + Sync {
    /// Connected participants.
    fn online(&self) -> Vec<ParticipantId>;

    fn population(&self) -> usize {
        self.online().len()
    }

    fn is_privileged(&self, id: ParticipantId) -> bool;

    /// Current block, if connected.
    fn position(&self, id: ParticipantId) -> Option<BlockPos>;
}

#[derive(Debug, Clone)]
struct Entry {
    pos: BlockPos,
    privileged: bool,
}

#[derive(Debug, Default)]
pub struct PresenceBoard {
    entries: Mutex<BTreeMap<ParticipantId, Entry>>,
}

impl PresenceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, id: ParticipantId, pos: BlockPos) {
        lock(&self.entries).insert(
            id,
            Entry {
                pos,
                privileged: false,
            },
        );
    }

    pub fn disconnect(&self, id: ParticipantId) -> bool {
        lock(&self.entries).remove(&id).is_some()
    }

    /// Move a connected participant; returns the previous block.
    pub fn move_to(&self, id: ParticipantId, pos: BlockPos) -> Option<BlockPos> {
        lock(&self.entries)
            .get_mut(&id)
            .map(|e| std::mem::replace(&mut e.pos, pos))
    }

    pub fn set_privileged(&self, id: ParticipantId, privileged: bool) {
        if let Some(e) = lock(&self.entries).get_mut(&id) {
            e.privileged = privileged;
        }
    }
}

impl Presence for PresenceBoard {
    fn online(&self) -> Vec<ParticipantId> {
        lock(&self.entries).keys().copied().collect()
    }

    fn population(&self) -> usize {
        lock(&self.entries).len()
    }

    fn is_privileged(&self, id: ParticipantId) -> bool {
        lock(&self.entries).get(&id).is_some_and(|e| e.privileged)
    }

    fn position(&self, id: ParticipantId) -> Option<BlockPos> {
        lock(&self.entries).get(&id).map(|e| e.pos.clone())
    }
}
