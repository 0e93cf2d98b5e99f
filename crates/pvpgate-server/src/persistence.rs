//! Save/load of the participant and zone record sets.
//!
//! Each set is a flat map keyed by string: participants by canonical
//! identity, zones by lowercase name. [`FileGateway`] writes one file per
//! set, JSON by default or bincode, through a temporary file and a rename
//! so a crash mid-write leaves the previous save intact. A missing file
//! loads as an empty set.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use pvpgate_logic::accrual::PolicyKind;
use pvpgate_logic::participant::ParticipantRecord;
use pvpgate_logic::zone::{Corner, Zone};

use crate::error::PersistError;
use crate::lock;

/// Version header of binary save files (increment when the layout changes).
pub const SAVE_VERSION: u32 = 1;

/// World assumed for zones saved without one.
pub const DEFAULT_WORLD: &str = "world";

/// One participant as written to disk.
///
/// The ratio-only fields are omitted under the milestone policy and read
/// back as zero when absent. Milestone payoff still counts
/// `forced_elapsed_seconds` in memory, so after a milestone reload that
/// count restarts from zero while the remaining debt carries over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredParticipant {
    pub manual_toggle: bool,
    pub cumulative_active_seconds: u64,
    pub processed_milestones: u32,
    pub debt_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub off_accumulator_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_elapsed_seconds: Option<u64>,
}

impl StoredParticipant {
    pub fn from_record(r: &ParticipantRecord, policy: PolicyKind) -> Self {
        let ratio = policy == PolicyKind::Ratio;
        Self {
            manual_toggle: r.manual_toggle,
            cumulative_active_seconds: r.cumulative_active_seconds,
            processed_milestones: r.processed_milestones,
            debt_seconds: r.debt_seconds,
            off_accumulator_seconds: ratio.then_some(r.off_accumulator_seconds),
            forced_elapsed_seconds: ratio.then_some(r.forced_elapsed_seconds),
        }
    }

    pub fn into_record(self) -> ParticipantRecord {
        ParticipantRecord {
            manual_toggle: self.manual_toggle,
            cumulative_active_seconds: self.cumulative_active_seconds,
            processed_milestones: self.processed_milestones,
            off_accumulator_seconds: self.off_accumulator_seconds.unwrap_or(0),
            debt_seconds: self.debt_seconds,
            forced_elapsed_seconds: self.forced_elapsed_seconds.unwrap_or(0),
        }
    }
}

/// Binary form of [`StoredParticipant`]. Bincode is not self-describing,
/// so the optional ratio fields travel as one always-present `Option`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryParticipant {
    manual_toggle: bool,
    cumulative_active_seconds: u64,
    processed_milestones: u32,
    debt_seconds: u64,
    ratio: Option<(u64, u64)>,
}

impl From<&StoredParticipant> for BinaryParticipant {
    fn from(p: &StoredParticipant) -> Self {
        let ratio = match (p.off_accumulator_seconds, p.forced_elapsed_seconds) {
            (None, None) => None,
            (acc, elapsed) => Some((acc.unwrap_or(0), elapsed.unwrap_or(0))),
        };
        Self {
            manual_toggle: p.manual_toggle,
            cumulative_active_seconds: p.cumulative_active_seconds,
            processed_milestones: p.processed_milestones,
            debt_seconds: p.debt_seconds,
            ratio,
        }
    }
}

impl From<BinaryParticipant> for StoredParticipant {
    fn from(p: BinaryParticipant) -> Self {
        Self {
            manual_toggle: p.manual_toggle,
            cumulative_active_seconds: p.cumulative_active_seconds,
            processed_milestones: p.processed_milestones,
            debt_seconds: p.debt_seconds,
            off_accumulator_seconds: p.ratio.map(|(acc, _)| acc),
            forced_elapsed_seconds: p.ratio.map(|(_, elapsed)| elapsed),
        }
    }
}

fn default_world() -> String {
    DEFAULT_WORLD.to_owned()
}

/// One zone as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredZone {
    /// Display name; empty or missing falls back to the map key.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_world")]
    pub world: String,
    pub x1: i32,
    pub y1: i32,
    pub z1: i32,
    pub x2: i32,
    pub y2: i32,
    pub z2: i32,
}

impl From<&Zone> for StoredZone {
    fn from(zone: &Zone) -> Self {
        let (min, max) = (zone.min(), zone.max());
        Self {
            name: zone.name().to_owned(),
            world: zone.world().to_owned(),
            x1: min.x,
            y1: min.y,
            z1: min.z,
            x2: max.x,
            y2: max.y,
            z2: max.z,
        }
    }
}

impl StoredZone {
    pub fn into_zone(self, key: &str) -> Zone {
        let name = if self.name.is_empty() {
            key.to_owned()
        } else {
            self.name
        };
        let world = if self.world.is_empty() {
            default_world()
        } else {
            self.world
        };
        Zone::new(
            name,
            world,
            Corner::new(self.x1, self.y1, self.z1),
            Corner::new(self.x2, self.y2, self.z2),
        )
    }
}

pub type ParticipantTable = BTreeMap<String, StoredParticipant>;
pub type ZoneTable = BTreeMap<String, StoredZone>;

/// Both record sets, copied out of memory and ready to write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub participants: ParticipantTable,
    pub zones: ZoneTable,
}

pub trait PersistenceGateway: Send + Sync {
    fn load_participants(&self) -> Result<ParticipantTable, PersistError>;
    fn load_zones(&self) -> Result<ZoneTable, PersistError>;
    fn save_participants(&self, table: &ParticipantTable) -> Result<(), PersistError>;
    fn save_zones(&self, table: &ZoneTable) -> Result<(), PersistError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotFormat {
    #[default]
    Json,
    Bincode,
}

impl SnapshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Bincode => "bin",
        }
    }
}

/// `participants.<ext>` and `zones.<ext>` inside one directory.
///
/// Writes through one gateway (and its clones) are serialized, so a
/// direct `persist` and the background snapshot never share a temp file.
#[derive(Debug, Clone)]
pub struct FileGateway {
    dir: PathBuf,
    format: SnapshotFormat,
    write_lock: Arc<Mutex<()>>,
}

impl FileGateway {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: SnapshotFormat::Json,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_format(mut self, format: SnapshotFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    pub fn participants_path(&self) -> PathBuf {
        self.path("participants")
    }

    pub fn zones_path(&self) -> PathBuf {
        self.path("zones")
    }

    fn path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.{}", self.format.extension()))
    }

    /// Raw bytes, or `None` if the file does not exist yet.
    fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>, PersistError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::io(path, e)),
        }
    }

    fn decode<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T, PersistError> {
        let Some(bytes) = self.read_bytes(path)? else {
            return Ok(T::default());
        };
        match self.format {
            SnapshotFormat::Json => {
                serde_json::from_slice(&bytes).map_err(|e| PersistError::json(path, e))
            }
            SnapshotFormat::Bincode => {
                let mut cursor = bytes.as_slice();
                let version: u32 = bincode::deserialize_from(&mut cursor)?;
                if version != SAVE_VERSION {
                    return Err(PersistError::Version {
                        expected: SAVE_VERSION,
                        found: version,
                    });
                }
                Ok(bincode::deserialize_from(&mut cursor)?)
            }
        }
    }

    fn encode<T: Serialize>(&self, path: &Path, value: &T) -> Result<Vec<u8>, PersistError> {
        match self.format {
            SnapshotFormat::Json => {
                serde_json::to_vec_pretty(value).map_err(|e| PersistError::json(path, e))
            }
            SnapshotFormat::Bincode => {
                let mut bytes = bincode::serialize(&SAVE_VERSION)?;
                bincode::serialize_into(&mut bytes, value)?;
                Ok(bytes)
            }
        }
    }

    /// Write through `<file>.<pid>.<n>.tmp` and rename over the target.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
        static WRITES: AtomicU64 = AtomicU64::new(0);

        let _guard = lock(&self.write_lock);
        fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            WRITES.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp = PathBuf::from(tmp);
        let mut file = fs::File::create(&tmp).map_err(|e| PersistError::io(&tmp, e))?;
        if let Err(e) = file.write_all(bytes).and_then(|()| file.sync_all()) {
            let _ = fs::remove_file(&tmp);
            return Err(PersistError::io(&tmp, e));
        }
        fs::rename(&tmp, path).map_err(|e| PersistError::io(path, e))
    }
}

impl PersistenceGateway for FileGateway {
    fn load_participants(&self) -> Result<ParticipantTable, PersistError> {
        let path = self.participants_path();
        match self.format {
            SnapshotFormat::Json => self.decode(&path),
            SnapshotFormat::Bincode => {
                let table: BTreeMap<String, BinaryParticipant> = self.decode(&path)?;
                Ok(table.into_iter().map(|(k, p)| (k, p.into())).collect())
            }
        }
    }

    fn load_zones(&self) -> Result<ZoneTable, PersistError> {
        self.decode(&self.zones_path())
    }

    fn save_participants(&self, table: &ParticipantTable) -> Result<(), PersistError> {
        let path = self.participants_path();
        let bytes = match self.format {
            SnapshotFormat::Json => self.encode(&path, table)?,
            SnapshotFormat::Bincode => {
                let binary: BTreeMap<&str, BinaryParticipant> =
                    table.iter().map(|(k, p)| (k.as_str(), p.into())).collect();
                self.encode(&path, &binary)?
            }
        };
        self.write_atomic(&path, &bytes)
    }

    fn save_zones(&self, table: &ZoneTable) -> Result<(), PersistError> {
        let path = self.zones_path();
        let bytes = self.encode(&path, table)?;
        self.write_atomic(&path, &bytes)
    }
}

/// Gateway holding the last save in memory. Writes can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    saved: Mutex<Snapshot>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(snapshot: Snapshot) -> Self {
        Self {
            saved: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    pub fn contents(&self) -> Snapshot {
        lock(&self.saved).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful participant saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PersistError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable("memory gateway set to fail".into()));
        }
        Ok(())
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load_participants(&self) -> Result<ParticipantTable, PersistError> {
        Ok(lock(&self.saved).participants.clone())
    }

    fn load_zones(&self) -> Result<ZoneTable, PersistError> {
        Ok(lock(&self.saved).zones.clone())
    }

    fn save_participants(&self, table: &ParticipantTable) -> Result<(), PersistError> {
        self.check()?;
        lock(&self.saved).participants = table.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn save_zones(&self, table: &ZoneTable) -> Result<(), PersistError> {
        self.check()?;
        lock(&self.saved).zones = table.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("pvpgate-{tag}-{}-{nanos}", std::process::id()))
    }

    fn sample() -> Snapshot {
        let mut participants = ParticipantTable::new();
        participants.insert(
            "00000000-0000-0000-0000-000000000001".into(),
            StoredParticipant {
                manual_toggle: true,
                cumulative_active_seconds: 7200,
                processed_milestones: 2,
                debt_seconds: 40,
                off_accumulator_seconds: Some(12),
                forced_elapsed_seconds: Some(3),
            },
        );
        participants.insert(
            "00000000-0000-0000-0000-000000000002".into(),
            StoredParticipant::default(),
        );
        let mut zones = ZoneTable::new();
        let zone = Zone::new("Arena", "world", Corner::new(0, 0, 0), Corner::new(9, 9, 9));
        zones.insert(zone.key(), StoredZone::from(&zone));
        Snapshot {
            participants,
            zones,
        }
    }

    #[test]
    fn test_milestone_omits_ratio_fields() {
        let r = ParticipantRecord {
            off_accumulator_seconds: 5,
            forced_elapsed_seconds: 6,
            debt_seconds: 10,
            ..Default::default()
        };
        let json =
            serde_json::to_value(StoredParticipant::from_record(&r, PolicyKind::Milestone)).unwrap();
        assert!(json.get("off_accumulator_seconds").is_none());
        assert!(json.get("forced_elapsed_seconds").is_none());
        assert_eq!(json["debt_seconds"], 10);

        let json =
            serde_json::to_value(StoredParticipant::from_record(&r, PolicyKind::Ratio)).unwrap();
        assert_eq!(json["off_accumulator_seconds"], 5);
        assert_eq!(json["forced_elapsed_seconds"], 6);
    }

    #[test]
    fn test_absent_fields_load_as_zero() {
        let p: StoredParticipant = serde_json::from_str(r#"{ "debt_seconds": 30 }"#).unwrap();
        let r = p.into_record();
        assert_eq!(r.debt_seconds, 30);
        assert_eq!(r.off_accumulator_seconds, 0);
        assert_eq!(r.forced_elapsed_seconds, 0);
        assert!(!r.manual_toggle);
    }

    #[test]
    fn test_zone_fallbacks() {
        let z: StoredZone =
            serde_json::from_str(r#"{ "x1": 5, "y1": 0, "z1": 5, "x2": 0, "y2": 3, "z2": 0 }"#)
                .unwrap();
        let zone = z.into_zone("pit");
        assert_eq!(zone.name(), "pit");
        assert_eq!(zone.world(), DEFAULT_WORLD);
        assert_eq!(zone.min(), Corner::new(0, 0, 0));
        assert_eq!(zone.max(), Corner::new(5, 3, 5));
    }

    #[test]
    fn test_file_round_trip_json() {
        let dir = scratch_dir("json");
        let gateway = FileGateway::new(&dir);
        let snap = sample();
        gateway.save_participants(&snap.participants).unwrap();
        gateway.save_zones(&snap.zones).unwrap();
        assert!(gateway.participants_path().ends_with("participants.json"));
        assert_eq!(gateway.load_participants().unwrap(), snap.participants);
        assert_eq!(gateway.load_zones().unwrap(), snap.zones);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_file_round_trip_bincode() {
        let dir = scratch_dir("bin");
        let gateway = FileGateway::new(&dir).with_format(SnapshotFormat::Bincode);
        let snap = sample();
        gateway.save_participants(&snap.participants).unwrap();
        gateway.save_zones(&snap.zones).unwrap();
        assert_eq!(gateway.load_participants().unwrap(), snap.participants);
        assert_eq!(gateway.load_zones().unwrap(), snap.zones);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_concurrent_writers_leave_one_whole_file() {
        let dir = scratch_dir("concurrent");
        let gateway = FileGateway::new(&dir);
        let tables: Vec<ParticipantTable> = (0..8u64)
            .map(|n| {
                (0..50u64)
                    .map(|i| {
                        let p = StoredParticipant {
                            debt_seconds: n * 1000 + i,
                            ..Default::default()
                        };
                        (format!("00000000-0000-0000-0000-{i:012x}"), p)
                    })
                    .collect()
            })
            .collect();

        let writers: Vec<_> = tables
            .iter()
            .cloned()
            .map(|table| {
                let gateway = gateway.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        gateway.save_participants(&table).unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let loaded = gateway.load_participants().unwrap();
        assert!(tables.contains(&loaded));
        let leftovers = fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_bincode_version_checked() {
        let dir = scratch_dir("version");
        let gateway = FileGateway::new(&dir).with_format(SnapshotFormat::Bincode);
        fs::create_dir_all(&dir).unwrap();
        let mut bytes = bincode::serialize(&(SAVE_VERSION + 1)).unwrap();
        bincode::serialize_into(&mut bytes, &ZoneTable::new()).unwrap();
        fs::write(gateway.zones_path(), bytes).unwrap();
        match gateway.load_zones() {
            Err(PersistError::Version { expected, found }) => {
                assert_eq!(expected, SAVE_VERSION);
                assert_eq!(found, SAVE_VERSION + 1);
            }
            other => panic!("expected version error, got {other:?}"),
        }
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_files_load_empty() {
        let gateway = FileGateway::new(scratch_dir("missing"));
        assert!(gateway.load_participants().unwrap().is_empty());
        assert!(gateway.load_zones().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json_reports_path() {
        let dir = scratch_dir("malformed");
        let gateway = FileGateway::new(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(gateway.zones_path(), "{ not json").unwrap();
        let err = gateway.load_zones().unwrap_err();
        assert!(matches!(err, PersistError::Json { .. }));
        assert!(err.to_string().contains("zones.json"));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_memory_gateway_failure_keeps_last_save() {
        let gateway = MemoryGateway::new();
        let snap = sample();
        gateway.save_participants(&snap.participants).unwrap();
        gateway.set_failing(true);
        assert!(gateway.save_participants(&ParticipantTable::new()).is_err());
        assert_eq!(gateway.contents().participants, snap.participants);
        assert_eq!(gateway.save_count(), 1);
    }
}
