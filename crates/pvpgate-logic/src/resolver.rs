//! Effective PvP state resolution.
//!
//! A participant fights with PvP on when any of these hold:
//!
//! | Source | Privilege bypasses it? |
//! |--------|------------------------|
//! | Manual toggle | n/a |
//! | Standing in a forced zone | only with `privileged_zone_exempt` |
//! | Outstanding debt | always |
//!
//! "Forced" is the same minus the manual toggle: the states in which the
//! participant may not switch PvP off.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::participant::ParticipantRecord;

/// What the resolver needs to know about one participant right now.
#[derive(Debug, Clone, Copy)]
pub struct StateInputs<'a> {
    pub record: &'a ParticipantRecord,
    pub in_zone: bool,
    pub privileged: bool,
}

/// Why PvP cannot be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForcedReason {
    Zone,
    Debt { remaining_seconds: u64 },
}

/// Rejected attempt to switch PvP off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ToggleError {
    #[error("PvP cannot be disabled inside a forced PvP zone")]
    ForcedByZone,
    #[error("PvP is forced due to playtime, {remaining_seconds}s remaining")]
    ForcedByDebt { remaining_seconds: u64 },
}

impl From<ForcedReason> for ToggleError {
    fn from(reason: ForcedReason) -> Self {
        match reason {
            ForcedReason::Zone => Self::ForcedByZone,
            ForcedReason::Debt { remaining_seconds } => Self::ForcedByDebt { remaining_seconds },
        }
    }
}

/// Outcome of one participant trying to damage another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngageDecision {
    Allowed,
    AttackerDisabled,
    VictimDisabled,
}

/// Stateless resolver carrying the zone-privilege rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolver {
    pub privileged_zone_exempt: bool,
}

impl Resolver {
    pub fn new(privileged_zone_exempt: bool) -> Self {
        Self {
            privileged_zone_exempt,
        }
    }

    fn zone_forces(&self, s: &StateInputs<'_>) -> bool {
        s.in_zone && !(s.privileged && self.privileged_zone_exempt)
    }

    fn debt_forces(&self, s: &StateInputs<'_>) -> bool {
        s.record.has_debt() && !s.privileged
    }

    /// The reason PvP is forced, zone first.
    pub fn forced_reason(&self, s: &StateInputs<'_>) -> Option<ForcedReason> {
        if self.zone_forces(s) {
            Some(ForcedReason::Zone)
        } else if self.debt_forces(s) {
            Some(ForcedReason::Debt {
                remaining_seconds: s.record.debt_seconds,
            })
        } else {
            None
        }
    }

    pub fn is_forced(&self, s: &StateInputs<'_>) -> bool {
        self.forced_reason(s).is_some()
    }

    pub fn is_effective(&self, s: &StateInputs<'_>) -> bool {
        s.record.manual_toggle || self.is_forced(s)
    }

    /// Turning PvP on always works; turning it off only when not forced.
    pub fn check_toggle(&self, s: &StateInputs<'_>, on: bool) -> Result<(), ToggleError> {
        if on {
            return Ok(());
        }
        match self.forced_reason(s) {
            Some(reason) => Err(reason.into()),
            None => Ok(()),
        }
    }
}

/// Both sides must have PvP effectively on; the attacker is checked first.
pub fn can_engage(attacker_effective: bool, victim_effective: bool) -> EngageDecision {
    if !attacker_effective {
        EngageDecision::AttackerDisabled
    } else if !victim_effective {
        EngageDecision::VictimDisabled
    } else {
        EngageDecision::Allowed
    }
}
