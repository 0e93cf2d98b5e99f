//! PvPGate runtime.
//!
//! Owns the shared state the pure `pvpgate-logic` crate leaves out: the
//! participant record store, the locked zone index, persistence, and the
//! scheduler that ticks every connected participant once per second.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | `ForceEngine`, every operation the host platform calls |
//! | [`error`] | Persistence errors |
//! | [`persistence`] | On-disk layout, file and in-memory gateways |
//! | [`presence`] | Connected participants collaborator |
//! | [`scheduler`] | 1 Hz tick job and periodic snapshot job |
//! | [`store`] | Participant record store |
//! | [`zones`] | Zone set, membership cache and operator selections |

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod engine;
pub mod error;
pub mod persistence;
pub mod presence;
pub mod scheduler;
pub mod store;
pub mod zones;

pub use engine::{ForceEngine, LoadReport, ParticipantStatus, TickSummary};
pub use error::PersistError;
pub use scheduler::TickScheduler;

/// Lock, recovering the guard if a previous holder panicked. Every guarded
/// value here is plain data left consistent after each mutation.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
