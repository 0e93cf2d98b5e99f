//! Forced-PvP debt accrual: the per-second state machine.
//!
//! Every connected participant is ticked once per second. A tick runs in a
//! fixed order:
//!
//! 1. advance `cumulative_active_seconds`;
//! 2. run the policy's accrual check;
//! 3. pay off one second of debt against the post-accrual value.
//!
//! So a participant can become forced and start paying off in the same tick.
//!
//! # Policies
//!
//! | Policy | Debt source | Cap | First-activation floor |
//! |--------|-------------|-----|------------------------|
//! | [`MilestonePolicy`] | each crossed multiple of the cycle length | none | none |
//! | [`RatioPolicy`] | each full window of non-exempt idle time | `max_debt_seconds` | `minimum_forced_seconds` |
//!
//! ```
//! use pvpgate_logic::accrual::{AccrualPolicy, MilestonePolicy, TickContext};
//! use pvpgate_logic::config::Exemptions;
//! use pvpgate_logic::participant::ParticipantRecord;
//!
//! let policy = AccrualPolicy::Milestone(MilestonePolicy::new(3600, 1200));
//! let mut record = ParticipantRecord::new(false);
//! record.cumulative_active_seconds = 3599;
//! let ctx = TickContext { population: 1, privileged: false, in_zone: false };
//!
//! let outcome = policy.tick(&mut record, &ctx, &Exemptions::default());
//! assert!(outcome.activated);
//! assert_eq!(record.debt_seconds, 1200);
//! ```

use serde::{Deserialize, Serialize};

use crate::config::Exemptions;
use crate::participant::ParticipantRecord;

/// Per-participant facts a tick needs from the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickContext {
    /// Connected participants, including this one.
    pub population: usize,
    /// Holds the bypass privilege.
    pub privileged: bool,
    /// Currently inside a forced zone. Only consulted when
    /// [`AccrualPolicy::needs_zone_check`] says so.
    pub in_zone: bool,
}

/// Why a ratio-policy tick did not count as idle time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exemption {
    Privileged,
    ManualToggle,
    ForcedZone,
    Solo,
}

/// Why debt did not count down this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Privileged,
    Solo,
}

/// What the payoff step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Payoff {
    /// No debt to pay.
    #[default]
    Idle,
    /// One second paid, debt remains.
    Paid,
    /// Last second paid; the forced period is over.
    Completed,
    Paused(PauseReason),
}

/// Result of one tick for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// Debt added by accrual, after cap and floor.
    pub debt_added: u64,
    /// Debt went from zero to positive during accrual.
    pub activated: bool,
    /// Ratio policy only: the reason idle time was not counted.
    pub exemption: Option<Exemption>,
    pub payoff: Payoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Milestone,
    Ratio,
}

/// Milestone-cycle policy: every `cycle_seconds` of playtime costs
/// `forced_seconds_per_cycle` of forced PvP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestonePolicy {
    cycle_seconds: u64,
    forced_seconds_per_cycle: u64,
}

impl MilestonePolicy {
    /// A zero cycle length is raised to one second.
    pub fn new(cycle_seconds: u64, forced_seconds_per_cycle: u64) -> Self {
        Self {
            cycle_seconds: cycle_seconds.max(1),
            forced_seconds_per_cycle,
        }
    }

    pub fn cycle_seconds(&self) -> u64 {
        self.cycle_seconds
    }

    pub fn forced_seconds_per_cycle(&self) -> u64 {
        self.forced_seconds_per_cycle
    }

    /// Privileged participants still advance their milestone counter so
    /// losing the privilege later never bills cycles already played.
    fn accrue(&self, record: &mut ParticipantRecord, ctx: &TickContext) {
        let reached = record.cumulative_active_seconds / self.cycle_seconds;
        let reached = u32::try_from(reached).unwrap_or(u32::MAX);
        if reached <= record.processed_milestones {
            return;
        }
        let crossed = reached - record.processed_milestones;
        record.processed_milestones = reached;

        if !ctx.privileged {
            let added = (crossed as u64).saturating_mul(self.forced_seconds_per_cycle);
            record.debt_seconds = record.debt_seconds.saturating_add(added);
        }
    }
}

/// Ratio policy: every `window_seconds` of non-exempt idle time adds
/// `increment_seconds` of debt, capped at `max_debt_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatioPolicy {
    window_seconds: u64,
    increment_seconds: u64,
    max_debt_seconds: u64,
    minimum_forced_seconds: u64,
}

impl RatioPolicy {
    /// A zero window is raised to one second; the minimum forced duration
    /// is capped at the maximum debt.
    pub fn new(
        window_seconds: u64,
        increment_seconds: u64,
        max_debt_seconds: u64,
        minimum_forced_seconds: u64,
    ) -> Self {
        Self {
            window_seconds: window_seconds.max(1),
            increment_seconds,
            max_debt_seconds,
            minimum_forced_seconds: minimum_forced_seconds.min(max_debt_seconds),
        }
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn increment_seconds(&self) -> u64 {
        self.increment_seconds
    }

    pub fn max_debt_seconds(&self) -> u64 {
        self.max_debt_seconds
    }

    pub fn minimum_forced_seconds(&self) -> u64 {
        self.minimum_forced_seconds
    }

    /// First matching exemption, checked in a fixed order.
    pub fn exemption(
        &self,
        record: &ParticipantRecord,
        ctx: &TickContext,
        exemptions: &Exemptions,
    ) -> Option<Exemption> {
        if ctx.privileged {
            Some(Exemption::Privileged)
        } else if exemptions.manual_toggle && record.manual_toggle {
            Some(Exemption::ManualToggle)
        } else if exemptions.forced_zones && ctx.in_zone {
            Some(Exemption::ForcedZone)
        } else if exemptions.solo && ctx.population < 2 {
            Some(Exemption::Solo)
        } else {
            None
        }
    }

    fn accrue(
        &self,
        record: &mut ParticipantRecord,
        ctx: &TickContext,
        exemptions: &Exemptions,
    ) -> Option<Exemption> {
        if let Some(exemption) = self.exemption(record, ctx, exemptions) {
            return Some(exemption);
        }

        record.off_accumulator_seconds = record.off_accumulator_seconds.saturating_add(1);
        let windows = record.off_accumulator_seconds / self.window_seconds;
        if windows == 0 {
            return None;
        }
        record.off_accumulator_seconds %= self.window_seconds;

        let was_idle = record.debt_seconds == 0;
        let added = windows.saturating_mul(self.increment_seconds);
        let capped = record
            .debt_seconds
            .saturating_add(added)
            .min(self.max_debt_seconds);
        record.debt_seconds = record.debt_seconds.max(capped);

        if was_idle && record.debt_seconds > 0 && record.debt_seconds < self.minimum_forced_seconds
        {
            record.debt_seconds = self.minimum_forced_seconds;
        }
        None
    }
}

/// The accrual strategy, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualPolicy {
    Milestone(MilestonePolicy),
    Ratio(RatioPolicy),
}

impl AccrualPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Milestone(_) => PolicyKind::Milestone,
            Self::Ratio(_) => PolicyKind::Ratio,
        }
    }

    /// Whether a tick needs to know if the participant stands in a zone.
    pub fn needs_zone_check(&self, exemptions: &Exemptions) -> bool {
        matches!(self, Self::Ratio(_)) && exemptions.forced_zones
    }

    /// Clamp an externally supplied debt value to what this policy allows.
    pub fn clamp_debt(&self, seconds: u64) -> u64 {
        match self {
            Self::Milestone(_) => seconds,
            Self::Ratio(p) => seconds.min(p.max_debt_seconds),
        }
    }

    /// Advance one participant by one second.
    pub fn tick(
        &self,
        record: &mut ParticipantRecord,
        ctx: &TickContext,
        exemptions: &Exemptions,
    ) -> TickOutcome {
        record.cumulative_active_seconds = record.cumulative_active_seconds.saturating_add(1);

        let debt_before = record.debt_seconds;
        let exemption = match self {
            Self::Milestone(p) => {
                p.accrue(record, ctx);
                None
            }
            Self::Ratio(p) => p.accrue(record, ctx, exemptions),
        };

        TickOutcome {
            debt_added: record.debt_seconds.saturating_sub(debt_before),
            activated: debt_before == 0 && record.debt_seconds > 0,
            exemption,
            payoff: pay_off(record, ctx, exemptions),
        }
    }
}

/// Count one second of debt down, unless paused.
fn pay_off(record: &mut ParticipantRecord, ctx: &TickContext, exemptions: &Exemptions) -> Payoff {
    if record.debt_seconds == 0 {
        return Payoff::Idle;
    }
    if ctx.privileged {
        return Payoff::Paused(PauseReason::Privileged);
    }
    if exemptions.solo && ctx.population < 2 {
        return Payoff::Paused(PauseReason::Solo);
    }

    record.debt_seconds -= 1;
    record.forced_elapsed_seconds += 1;
    if record.debt_seconds > 0 {
        return Payoff::Paid;
    }
    record.forced_elapsed_seconds = 0;
    record.off_accumulator_seconds = 0;
    Payoff::Completed
}
