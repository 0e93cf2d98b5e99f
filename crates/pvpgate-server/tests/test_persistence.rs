//! Save/load through the file gateway.
//!
//! Exercises: round trips of arbitrary records in both formats, the
//! on-disk JSON layout, and recovery from a hand-edited file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use proptest::prelude::*;
use pvpgate_logic::config::{ForceConfig, PolicyConfig, RatioConfig};
use pvpgate_logic::identity::{BlockPos, ParticipantId};
use pvpgate_logic::participant::ParticipantRecord;
use pvpgate_logic::zone::SelectionSlot;
use pvpgate_server::persistence::{FileGateway, SnapshotFormat};
use pvpgate_server::presence::PresenceBoard;
use pvpgate_server::store::{MemoryRecordStore, RecordStore};
use pvpgate_server::ForceEngine;

// ── Helpers ────────────────────────────────────────────────────────────

fn scratch_dir() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "pvpgate-it-{}-{}-{}",
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

fn ratio_config() -> ForceConfig {
    ForceConfig {
        policy: PolicyConfig::Ratio(RatioConfig::default()),
        ..Default::default()
    }
}

fn engine_at(config: &ForceConfig, gateway: FileGateway) -> ForceEngine {
    ForceEngine::from_config(
        config,
        Arc::new(MemoryRecordStore::new()),
        Arc::new(PresenceBoard::new()),
        Arc::new(gateway),
    )
}

fn record() -> impl Strategy<Value = ParticipantRecord> {
    (
        any::<bool>(),
        any::<u64>(),
        any::<u32>(),
        0u64..300,
        0u64..=3600,
        0u64..10_000,
    )
        .prop_map(|(toggle, active, milestones, acc, debt, elapsed)| ParticipantRecord {
            manual_toggle: toggle,
            cumulative_active_seconds: active,
            processed_milestones: milestones,
            off_accumulator_seconds: acc,
            debt_seconds: debt,
            forced_elapsed_seconds: if debt == 0 { 0 } else { elapsed },
        })
}

fn round_trip(format: SnapshotFormat, records: Vec<(u128, ParticipantRecord)>) {
    let dir = scratch_dir();
    let config = ratio_config();

    let store = Arc::new(MemoryRecordStore::new());
    for (id, r) in &records {
        store.put(ParticipantId::from_u128(*id), r.clone());
    }
    let writer = ForceEngine::from_config(
        &config,
        store,
        Arc::new(PresenceBoard::new()),
        Arc::new(FileGateway::new(&dir).with_format(format)),
    );
    writer.persist().unwrap();
    let expected = writer.records();

    let reader = engine_at(&config, FileGateway::new(&dir).with_format(format));
    let report = reader.load().unwrap();
    assert_eq!(report.participants, expected.len());
    assert_eq!(report.skipped_keys, 0);
    assert_eq!(reader.records(), expected);

    let _ = std::fs::remove_dir_all(dir);
}

// ── Round trips ────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn json_round_trip_reproduces_records(
        records in prop::collection::vec((any::<u128>(), record()), 0..20),
    ) {
        round_trip(SnapshotFormat::Json, records);
    }

    #[test]
    fn bincode_round_trip_reproduces_records(
        records in prop::collection::vec((any::<u128>(), record()), 0..20),
    ) {
        round_trip(SnapshotFormat::Bincode, records);
    }
}

#[test]
fn milestone_round_trip_restarts_elapsed_count() {
    let dir = scratch_dir();
    let config = ForceConfig::default();
    let id = ParticipantId::from_u128(5);

    let store = Arc::new(MemoryRecordStore::new());
    store.put(
        id,
        ParticipantRecord {
            manual_toggle: true,
            cumulative_active_seconds: 7300,
            processed_milestones: 2,
            off_accumulator_seconds: 0,
            debt_seconds: 2000,
            forced_elapsed_seconds: 400,
        },
    );
    let writer = ForceEngine::from_config(
        &config,
        store,
        Arc::new(PresenceBoard::new()),
        Arc::new(FileGateway::new(&dir)),
    );
    writer.persist().unwrap();

    let reader = engine_at(&config, FileGateway::new(&dir));
    reader.load().unwrap();
    let r = reader.record(id);
    assert!(r.manual_toggle);
    assert_eq!(r.cumulative_active_seconds, 7300);
    assert_eq!(r.processed_milestones, 2);
    assert_eq!(r.debt_seconds, 2000);
    assert_eq!(r.forced_elapsed_seconds, 0);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn zones_survive_restart() {
    let dir = scratch_dir();
    let config = ForceConfig::default();
    let op = ParticipantId::from_u128(1);

    let first = engine_at(&config, FileGateway::new(&dir));
    first.set_selection_point(op, SelectionSlot::First, BlockPos::new("world", 10, 0, -10));
    first.set_selection_point(op, SelectionSlot::Second, BlockPos::new("world", -10, 20, 10));
    first.create_zone("Spawn", op).unwrap();
    first.set_selection_point(op, SelectionSlot::First, BlockPos::new("world_nether", 0, 0, 0));
    first.set_selection_point(op, SelectionSlot::Second, BlockPos::new("world_nether", 3, 3, 3));
    first.create_zone("pit", op).unwrap();
    first.persist().unwrap();

    let second = engine_at(&config, FileGateway::new(&dir));
    let report = second.load().unwrap();
    assert_eq!(report.zones, 2);
    let spawn = second.zone("spawn").unwrap();
    assert_eq!(spawn.name(), "Spawn");
    assert_eq!(spawn.world(), "world");
    assert!(second.in_zone(&BlockPos::new("world", -10, 0, -10)));
    assert!(second.in_zone(&BlockPos::new("world_nether", 3, 3, 3)));
    assert!(!second.in_zone(&BlockPos::new("world", 3, 3, 3 + 20)));

    let _ = std::fs::remove_dir_all(dir);
}

// ── On-disk layout ─────────────────────────────────────────────────────

#[test]
fn json_layout_matches_policy() {
    let dir = scratch_dir();
    let id = ParticipantId::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);

    let milestone = engine_at(&ForceConfig::default(), FileGateway::new(&dir));
    milestone.set_debt(id, 30);
    milestone.persist().unwrap();
    let text = std::fs::read_to_string(dir.join("participants.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let entry = &json["01234567-89ab-cdef-0123-456789abcdef"];
    assert_eq!(entry["debt_seconds"], 30);
    assert!(entry.get("off_accumulator_seconds").is_none());

    let ratio = engine_at(&ratio_config(), FileGateway::new(&dir));
    ratio.load().unwrap();
    ratio.persist().unwrap();
    let text = std::fs::read_to_string(dir.join("participants.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let entry = &json["01234567-89ab-cdef-0123-456789abcdef"];
    assert_eq!(entry["off_accumulator_seconds"], 0);
    assert_eq!(entry["forced_elapsed_seconds"], 0);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn hand_edited_files_load_leniently() {
    let dir = scratch_dir();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("participants.json"),
        r#"{
            "00000000-0000-0000-0000-00000000000a": { "manual_toggle": true },
            "steve": { "debt_seconds": 100 },
            "00000000-0000-0000-0000-00000000000b": { "debt_seconds": 100, "forced_elapsed_seconds": 20 }
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("zones.json"),
        r#"{ "arena": { "x1": 0, "y1": 0, "z1": 0, "x2": 4, "y2": 4, "z2": 4 } }"#,
    )
    .unwrap();

    let engine = engine_at(&ForceConfig::default(), FileGateway::new(&dir));
    let report = engine.load().unwrap();
    assert_eq!(report.participants, 2);
    assert_eq!(report.skipped_keys, 1);
    assert_eq!(report.zones, 1);

    assert!(engine.record(ParticipantId::from_u128(0xa)).manual_toggle);
    let b = engine.record(ParticipantId::from_u128(0xb));
    assert_eq!((b.debt_seconds, b.forced_elapsed_seconds), (100, 20));
    let arena = engine.zone("Arena").unwrap();
    assert_eq!(arena.name(), "arena");
    assert_eq!(arena.world(), "world");

    let _ = std::fs::remove_dir_all(dir);
}
