//! Force engine - main entry point for the host platform.
//!
//! Combines the record store, zone index, presence collaborator and
//! persistence gateway, and exposes every query and mutation the host
//! needs: combat checks, the toggle, administrative overrides, zone
//! management, the per-second tick, and save/load.

use std::sync::Arc;

use tokio::sync::Notify;

use pvpgate_logic::accrual::{Payoff, PolicyKind, TickContext, TickOutcome};
use pvpgate_logic::config::{ForceConfig, Settings};
use pvpgate_logic::identity::{BlockPos, ParticipantId};
use pvpgate_logic::participant::ParticipantRecord;
use pvpgate_logic::resolver::{
    self, EngageDecision, ForcedReason, Resolver, StateInputs, ToggleError,
};
use pvpgate_logic::zone::{SelectionSlot, Zone, ZoneError, ZoneTransition};

use crate::error::PersistError;
use crate::persistence::{PersistenceGateway, Snapshot, StoredParticipant, StoredZone};
use crate::presence::Presence;
use crate::store::RecordStore;
use crate::zones::ZoneIndex;

/// What one tick pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub population: usize,
    pub processed: usize,
    /// Participants newly forced this tick, with their debt.
    pub activated: Vec<(ParticipantId, u64)>,
    /// Participants whose forced period ended this tick.
    pub completed: Vec<ParticipantId>,
    /// Participants holding debt that did not count down.
    pub paused: usize,
}

/// Everything an admin status view shows for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantStatus {
    pub id: ParticipantId,
    pub record: ParticipantRecord,
    pub effective: bool,
    pub forced: Option<ForcedReason>,
    pub in_zone: bool,
    pub privileged: bool,
    pub population: usize,
    pub policy: PolicyKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub participants: usize,
    /// Participant keys that were not valid identities.
    pub skipped_keys: usize,
    pub zones: usize,
    /// Zones dropped because another zone already had the name.
    pub rejected_zones: usize,
}

pub struct ForceEngine {
    settings: Settings,
    resolver: Resolver,
    records: Arc<dyn RecordStore>,
    zones: ZoneIndex,
    presence: Arc<dyn Presence>,
    gateway: Arc<dyn PersistenceGateway>,
    save_requested: Notify,
}

impl ForceEngine {
    pub fn new(
        settings: Settings,
        records: Arc<dyn RecordStore>,
        presence: Arc<dyn Presence>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            resolver: Resolver::new(settings.privileged_zone_exempt),
            zones: ZoneIndex::new(settings.membership_cache_capacity),
            settings,
            records,
            presence,
            gateway,
            save_requested: Notify::new(),
        }
    }

    /// Resolve `config`, logging every clamped value.
    pub fn from_config(
        config: &ForceConfig,
        records: Arc<dyn RecordStore>,
        presence: Arc<dyn Presence>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let (settings, warnings) = config.resolve();
        for warning in &warnings {
            log::warn!("{}", warning);
        }
        log::info!(
            "PvP force engine using {:?} policy, snapshot every {}s",
            settings.policy.kind(),
            settings.snapshot_interval.as_secs()
        );
        Self::new(settings, records, presence, gateway)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn zones(&self) -> &ZoneIndex {
        &self.zones
    }

    pub(crate) fn save_requested(&self) -> &Notify {
        &self.save_requested
    }

    fn mutate(&self, id: ParticipantId, f: &mut dyn FnMut(&mut ParticipantRecord)) {
        let default_toggle = self.settings.default_toggle;
        self.records
            .update(id, &move || ParticipantRecord::new(default_toggle), f);
    }

    // ---- Records -------------------------------------------------------

    /// The participant's record, created with defaults if unseen.
    pub fn record(&self, id: ParticipantId) -> ParticipantRecord {
        let default_toggle = self.settings.default_toggle;
        self.records
            .get_or_create(id, &move || ParticipantRecord::new(default_toggle))
    }

    /// Every record, sorted by id.
    pub fn records(&self) -> Vec<(ParticipantId, ParticipantRecord)> {
        self.records.entries()
    }

    /// Replace the record with a fresh default one.
    pub fn reset_record(&self, id: ParticipantId) -> ParticipantRecord {
        let fresh = ParticipantRecord::new(self.settings.default_toggle);
        self.records.put(id, fresh.clone());
        log::info!("Reset PvP record of {}", id);
        fresh
    }

    // ---- Resolution ----------------------------------------------------

    fn resolve<T>(
        &self,
        id: ParticipantId,
        pos: &BlockPos,
        f: impl FnOnce(&StateInputs<'_>) -> T,
    ) -> T {
        let record = self.record(id);
        f(&StateInputs {
            record: &record,
            in_zone: self.zones.contains(pos),
            privileged: self.presence.is_privileged(id),
        })
    }

    pub fn is_effective(&self, id: ParticipantId, pos: &BlockPos) -> bool {
        self.resolve(id, pos, |s| self.resolver.is_effective(s))
    }

    pub fn is_forced(&self, id: ParticipantId, pos: &BlockPos) -> bool {
        self.resolve(id, pos, |s| self.resolver.is_forced(s))
    }

    pub fn forced_reason(&self, id: ParticipantId, pos: &BlockPos) -> Option<ForcedReason> {
        self.resolve(id, pos, |s| self.resolver.forced_reason(s))
    }

    /// Switch the manual toggle. Switching off fails while forced; the check
    /// and the write happen under the same record lock.
    pub fn set_toggle(
        &self,
        id: ParticipantId,
        pos: &BlockPos,
        on: bool,
    ) -> Result<(), ToggleError> {
        let in_zone = self.zones.contains(pos);
        let privileged = self.presence.is_privileged(id);
        let mut result = Ok(());
        self.mutate(id, &mut |r| {
            let inputs = StateInputs {
                record: &*r,
                in_zone,
                privileged,
            };
            result = self.resolver.check_toggle(&inputs, on);
            if result.is_ok() {
                r.manual_toggle = on;
            }
        });
        result
    }

    /// Whether `attacker` may damage `victim`. Self-inflicted damage is
    /// never gated.
    pub fn can_engage(
        &self,
        attacker: ParticipantId,
        attacker_pos: &BlockPos,
        victim: ParticipantId,
        victim_pos: &BlockPos,
    ) -> EngageDecision {
        if attacker == victim {
            return EngageDecision::Allowed;
        }
        resolver::can_engage(
            self.is_effective(attacker, attacker_pos),
            self.is_effective(victim, victim_pos),
        )
    }

    pub fn status(&self, id: ParticipantId, pos: &BlockPos) -> ParticipantStatus {
        let record = self.record(id);
        let inputs = StateInputs {
            record: &record,
            in_zone: self.zones.contains(pos),
            privileged: self.presence.is_privileged(id),
        };
        let forced = self.resolver.forced_reason(&inputs);
        let effective = self.resolver.is_effective(&inputs);
        let (in_zone, privileged) = (inputs.in_zone, inputs.privileged);
        ParticipantStatus {
            id,
            effective,
            forced,
            in_zone,
            privileged,
            population: self.presence.population(),
            policy: self.settings.policy.kind(),
            record,
        }
    }

    // ---- Administrative overrides --------------------------------------

    /// Set remaining debt, clamped to the policy cap. Returns the value
    /// applied. Zero also clears the forced-elapsed counter.
    pub fn set_debt(&self, id: ParticipantId, seconds: u64) -> u64 {
        let applied = self.settings.policy.clamp_debt(seconds);
        self.mutate(id, &mut |r| r.set_debt(applied));
        log::info!("Set PvP debt of {} to {}s", id, applied);
        applied
    }

    /// Credit playtime; crossed milestones convert on the next tick.
    pub fn add_playtime(&self, id: ParticipantId, seconds: u64) -> u64 {
        let mut total = 0;
        self.mutate(id, &mut |r| {
            r.cumulative_active_seconds = r.cumulative_active_seconds.saturating_add(seconds);
            total = r.cumulative_active_seconds;
        });
        total
    }

    /// Credit idle PvP-off time; full windows convert on the next
    /// non-exempt tick, all at once.
    pub fn add_off_time(&self, id: ParticipantId, seconds: u64) -> u64 {
        let mut total = 0;
        self.mutate(id, &mut |r| {
            r.off_accumulator_seconds = r.off_accumulator_seconds.saturating_add(seconds);
            total = r.off_accumulator_seconds;
        });
        total
    }

    pub fn reset_timer(&self, id: ParticipantId) {
        self.mutate(id, &mut |r| r.reset_timer());
        log::info!("Reset PvP timer of {}", id);
    }

    // ---- Lifecycle hooks -----------------------------------------------

    /// Ensure a record exists. Returns outstanding debt worth reminding the
    /// participant about.
    pub fn on_join(&self, id: ParticipantId) -> Option<u64> {
        let record = self.record(id);
        if record.has_debt() && !self.presence.is_privileged(id) {
            log::debug!("{} joined with {}s of forced PvP left", id, record.debt_seconds);
            Some(record.debt_seconds)
        } else {
            None
        }
    }

    /// Ask the running scheduler for an immediate background save.
    pub fn on_quit(&self, id: ParticipantId) {
        log::debug!("{} left, requesting snapshot", id);
        self.save_requested.notify_one();
    }

    // ---- Zones ---------------------------------------------------------

    pub fn set_selection_point(&self, operator: ParticipantId, slot: SelectionSlot, pos: BlockPos) {
        self.zones.set_selection_point(operator, slot, pos);
    }

    pub fn create_zone(&self, name: &str, operator: ParticipantId) -> Result<Zone, ZoneError> {
        let zone = self.zones.create(name, operator)?;
        log::info!(
            "Created forced PvP zone '{}' in {} ({} blocks)",
            zone.name(),
            zone.world(),
            zone.volume()
        );
        Ok(zone)
    }

    pub fn delete_zone(&self, name: &str) -> Option<Zone> {
        let removed = self.zones.delete(name);
        if let Some(zone) = &removed {
            log::info!("Deleted forced PvP zone '{}'", zone.name());
        }
        removed
    }

    pub fn zone(&self, name: &str) -> Option<Zone> {
        self.zones.get(name)
    }

    pub fn list_zones(&self) -> Vec<Zone> {
        self.zones.list()
    }

    pub fn zone_names(&self) -> Vec<String> {
        self.zones.names()
    }

    pub fn in_zone(&self, pos: &BlockPos) -> bool {
        self.zones.contains(pos)
    }

    pub fn zone_transition(&self, from: &BlockPos, to: &BlockPos) -> Option<ZoneTransition> {
        self.zones.transition(from, to)
    }

    // ---- Tick ----------------------------------------------------------

    /// Advance every connected participant by one second.
    pub fn tick(&self) -> TickSummary {
        let online = self.presence.online();
        let population = self.presence.population();
        let policy = self.settings.policy;
        let exemptions = self.settings.exemptions;
        let zone_check = policy.needs_zone_check(&exemptions);

        let mut summary = TickSummary {
            population,
            ..Default::default()
        };
        for id in online {
            let in_zone = zone_check
                && self
                    .presence
                    .position(id)
                    .is_some_and(|pos| self.zones.contains(&pos));
            let ctx = TickContext {
                population,
                privileged: self.presence.is_privileged(id),
                in_zone,
            };

            let mut outcome = TickOutcome::default();
            self.mutate(id, &mut |r| outcome = policy.tick(r, &ctx, &exemptions));

            summary.processed += 1;
            if outcome.activated {
                log::debug!("{} is now forced into PvP for {}s", id, outcome.debt_added);
                summary.activated.push((id, outcome.debt_added));
            }
            match outcome.payoff {
                Payoff::Completed => {
                    log::debug!("{} is no longer forced into PvP", id);
                    summary.completed.push(id);
                }
                Payoff::Paused(_) => summary.paused += 1,
                Payoff::Idle | Payoff::Paid => {}
            }
        }
        summary
    }

    // ---- Persistence ---------------------------------------------------

    /// Copy both record sets. Locks are held only while copying.
    pub fn snapshot(&self) -> Snapshot {
        let kind = self.settings.policy.kind();
        let participants = self
            .records
            .entries()
            .into_iter()
            .map(|(id, r)| (id.to_string(), StoredParticipant::from_record(&r, kind)))
            .collect();
        let zones = self
            .zones
            .list()
            .iter()
            .map(|z| (z.key(), StoredZone::from(z)))
            .collect();
        Snapshot {
            participants,
            zones,
        }
    }

    /// Write a snapshot through the gateway. Both sets are attempted even
    /// if the first fails; memory stays authoritative either way.
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let participants = self.gateway.save_participants(&snapshot.participants);
        if let Err(e) = &participants {
            log::error!("Failed to save participant records: {}", e);
        }
        let zones = self.gateway.save_zones(&snapshot.zones);
        if let Err(e) = &zones {
            log::error!("Failed to save zones: {}", e);
        }
        participants.and(zones)
    }

    /// Snapshot and write in the calling thread.
    pub fn persist(&self) -> Result<(), PersistError> {
        self.write_snapshot(&self.snapshot())
    }

    /// Replace in-memory state with what the gateway holds. Invalid
    /// participant keys and duplicate zone names are skipped with a
    /// warning; debt is clamped to the current policy.
    pub fn load(&self) -> Result<LoadReport, PersistError> {
        let participants = self.gateway.load_participants()?;
        let zones = self.gateway.load_zones()?;
        let mut report = LoadReport::default();

        let mut records = Vec::with_capacity(participants.len());
        for (key, stored) in participants {
            match key.parse::<ParticipantId>() {
                Ok(id) => {
                    let mut record = stored.into_record();
                    record.set_debt(self.settings.policy.clamp_debt(record.debt_seconds));
                    records.push((id, record));
                }
                Err(e) => {
                    log::warn!("Skipping participant record with invalid id '{}': {}", key, e);
                    report.skipped_keys += 1;
                }
            }
        }
        report.participants = records.len();
        self.records.replace_all(records);

        let zones: Vec<Zone> = zones
            .into_iter()
            .map(|(key, stored)| stored.into_zone(&key))
            .collect();
        let total = zones.len();
        let rejected = self.zones.replace_all(zones);
        for zone in &rejected {
            log::warn!("Skipping duplicate zone '{}'", zone.name());
        }
        report.zones = total - rejected.len();
        report.rejected_zones = rejected.len();

        log::info!(
            "Loaded {} participant record(s) and {} zone(s)",
            report.participants,
            report.zones
        );
        Ok(report)
    }
}
