//! Pure PvP gating logic for PvPGate.
//!
//! This crate decides whether a participant may fight other participants
//! and runs the playtime penalty that forces PvP on for a while once it has
//! been kept off too long. Everything here is plain data in, plain data
//! out: no locks, no I/O, no clock. The runtime that owns shared state and
//! drives the 1 Hz tick lives in `pvpgate-server`.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`accrual`] | Per-second debt state machine, milestone and ratio policies |
//! | [`cache`] | Bounded LRU cache of zone membership answers |
//! | [`config`] | Operator configuration, defaults and clamps |
//! | [`identity`] | Participant ids and block positions |
//! | [`participant`] | Per-participant toggle, playtime and debt record |
//! | [`resolver`] | Effective / forced PvP state, toggle and combat checks |
//! | [`zone`] | Forced-PvP cuboids, operator selections, the zone set |

pub mod accrual;
pub mod cache;
pub mod config;
pub mod identity;
pub mod participant;
pub mod resolver;
pub mod zone;
