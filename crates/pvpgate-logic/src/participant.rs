//! Per-participant PvP state: manual toggle, playtime, and forced-PvP debt.

use serde::{Deserialize, Serialize};

/// Everything tracked for one participant.
///
/// `debt_seconds == 0` implies `forced_elapsed_seconds == 0`; every mutator
/// in this crate preserves that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// The participant's own PvP switch.
    pub manual_toggle: bool,
    /// Total seconds spent connected.
    pub cumulative_active_seconds: u64,
    /// Playtime cycles already converted into debt (milestone policy).
    pub processed_milestones: u32,
    /// Idle PvP-off seconds not yet converted into debt (ratio policy).
    pub off_accumulator_seconds: u64,
    /// Remaining forced-PvP seconds.
    pub debt_seconds: u64,
    /// Seconds of debt paid off since the current forced period began.
    pub forced_elapsed_seconds: u64,
}

impl ParticipantRecord {
    /// Fresh record with the configured default toggle.
    pub fn new(default_toggle: bool) -> Self {
        Self {
            manual_toggle: default_toggle,
            ..Self::default()
        }
    }

    pub fn has_debt(&self) -> bool {
        self.debt_seconds > 0
    }

    /// Administrative override of the remaining debt.
    pub fn set_debt(&mut self, seconds: u64) {
        self.debt_seconds = seconds;
        if seconds == 0 {
            self.forced_elapsed_seconds = 0;
        }
    }

    /// Clear debt, idle accumulator, and forced-elapsed counter.
    pub fn reset_timer(&mut self) {
        self.debt_seconds = 0;
        self.off_accumulator_seconds = 0;
        self.forced_elapsed_seconds = 0;
    }
}
