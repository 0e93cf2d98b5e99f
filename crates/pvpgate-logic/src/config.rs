//! Operator configuration and its validation into runtime settings.
//!
//! [`ForceConfig`] mirrors the on-disk shape: every field is optional in the
//! source (missing ones take defaults) and numeric durations are signed so
//! a bad value in the file is still representable. [`ForceConfig::resolve`]
//! turns it into [`Settings`], clamping anything that would divide by zero
//! or run backwards and reporting each clamp as a [`ConfigWarning`].
//!
//! ```
//! use pvpgate_logic::config::{ForceConfig, PolicyConfig, MilestoneConfig};
//!
//! let config = ForceConfig {
//!     policy: PolicyConfig::Milestone(MilestoneConfig {
//!         cycle_seconds: 0,
//!         forced_seconds_per_cycle: 1200,
//!     }),
//!     ..Default::default()
//! };
//! let (_settings, warnings) = config.resolve();
//! assert_eq!(warnings.len(), 1);
//! assert_eq!(warnings[0].field, "policy.cycle_seconds");
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::accrual::{AccrualPolicy, MilestonePolicy, RatioPolicy};

/// Default snapshot cadence.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: i64 = 5 * 60;

/// Default membership cache size.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Which conditions stop idle time from counting, and whether a lone
/// participant's debt is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exemptions {
    /// Manual PvP on counts as not idle (ratio policy).
    pub manual_toggle: bool,
    /// Standing in a forced zone counts as not idle (ratio policy).
    pub forced_zones: bool,
    /// Fewer than two participants online: no idle time and no payoff.
    pub solo: bool,
}

impl Default for Exemptions {
    fn default() -> Self {
        Self {
            manual_toggle: true,
            forced_zones: true,
            solo: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneConfig {
    pub cycle_seconds: i64,
    pub forced_seconds_per_cycle: i64,
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            cycle_seconds: 3600,
            forced_seconds_per_cycle: 20 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioConfig {
    /// Idle seconds that convert into one increment.
    pub window_seconds: i64,
    pub increment_seconds: i64,
    pub max_debt_seconds: i64,
    /// Floor applied when debt first becomes positive.
    pub minimum_forced_seconds: i64,
}

impl Default for RatioConfig {
    fn default() -> Self {
        Self {
            window_seconds: 5 * 60,
            increment_seconds: 60,
            max_debt_seconds: 60 * 60,
            minimum_forced_seconds: 20 * 60,
        }
    }
}

/// Accrual policy selection, tagged by `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    Milestone(MilestoneConfig),
    Ratio(RatioConfig),
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::Milestone(MilestoneConfig::default())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// Manual toggle given to newly seen participants.
    pub default_toggle: bool,
    pub snapshot_interval_secs: i64,
    /// Privileged participants ignore forced zones too, not just debt.
    pub privileged_zone_exempt: bool,
    pub membership_cache_capacity: usize,
    pub exemptions: Exemptions,
    pub policy: PolicyConfig,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            default_toggle: false,
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            privileged_zone_exempt: false,
            membership_cache_capacity: DEFAULT_CACHE_CAPACITY,
            exemptions: Exemptions::default(),
            policy: PolicyConfig::default(),
        }
    }
}

/// A configuration value that was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub found: i64,
    pub used: i64,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config value {} = {} is out of range, using {}",
            self.field, self.found, self.used
        )
    }
}

/// Validated runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub default_toggle: bool,
    pub snapshot_interval: Duration,
    pub privileged_zone_exempt: bool,
    pub membership_cache_capacity: usize,
    pub exemptions: Exemptions,
    pub policy: AccrualPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        ForceConfig::default().resolve().0
    }
}

/// Collects clamps while resolving.
struct Clamp(Vec<ConfigWarning>);

impl Clamp {
    /// `value` if it is at least `min`, otherwise `fallback`.
    fn at_least(&mut self, field: &'static str, value: i64, min: i64, fallback: i64) -> u64 {
        if value >= min {
            return value as u64;
        }
        self.0.push(ConfigWarning {
            field,
            found: value,
            used: fallback,
        });
        fallback as u64
    }

    /// `value` if it is at most `max`, otherwise `max`.
    fn at_most(&mut self, field: &'static str, value: u64, max: u64) -> u64 {
        if value <= max {
            return value;
        }
        self.0.push(ConfigWarning {
            field,
            found: value as i64,
            used: max as i64,
        });
        max
    }
}

impl ForceConfig {
    /// Validate into [`Settings`], clamping bad values.
    pub fn resolve(&self) -> (Settings, Vec<ConfigWarning>) {
        let mut clamp = Clamp(Vec::new());

        let policy = match self.policy {
            PolicyConfig::Milestone(m) => AccrualPolicy::Milestone(MilestonePolicy::new(
                clamp.at_least("policy.cycle_seconds", m.cycle_seconds, 1, 1),
                clamp.at_least(
                    "policy.forced_seconds_per_cycle",
                    m.forced_seconds_per_cycle,
                    0,
                    0,
                ),
            )),
            PolicyConfig::Ratio(r) => {
                let window = clamp.at_least("policy.window_seconds", r.window_seconds, 1, 1);
                let increment =
                    clamp.at_least("policy.increment_seconds", r.increment_seconds, 0, 0);
                let max_debt = clamp.at_least("policy.max_debt_seconds", r.max_debt_seconds, 0, 0);
                let minimum = clamp.at_least(
                    "policy.minimum_forced_seconds",
                    r.minimum_forced_seconds,
                    0,
                    0,
                );
                let minimum = clamp.at_most("policy.minimum_forced_seconds", minimum, max_debt);
                AccrualPolicy::Ratio(RatioPolicy::new(window, increment, max_debt, minimum))
            }
        };

        let snapshot_secs = clamp.at_least(
            "snapshot_interval_secs",
            self.snapshot_interval_secs,
            1,
            DEFAULT_SNAPSHOT_INTERVAL_SECS,
        );
        let capacity = if self.membership_cache_capacity == 0 {
            clamp.0.push(ConfigWarning {
                field: "membership_cache_capacity",
                found: 0,
                used: 1,
            });
            1
        } else {
            self.membership_cache_capacity
        };

        let settings = Settings {
            default_toggle: self.default_toggle,
            snapshot_interval: Duration::from_secs(snapshot_secs),
            privileged_zone_exempt: self.privileged_zone_exempt,
            membership_cache_capacity: capacity,
            exemptions: self.exemptions,
            policy,
        };
        (settings, clamp.0)
    }
}
