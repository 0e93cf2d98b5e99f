//! Participant record storage.
//!
//! Every mutation goes through [`RecordStore::update`], which runs one
//! closure under the store's exclusion, so the tick pass and
//! administrative overrides never interleave on the same record.

use std::collections::HashMap;
use std::sync::Mutex;

use pvpgate_logic::identity::ParticipantId;
use pvpgate_logic::participant::ParticipantRecord;

use crate::lock;

pub trait RecordStore: Send + Sync {
    fn get(&self, id: ParticipantId) -> Option<ParticipantRecord>;

    fn put(&self, id: ParticipantId, record: ParticipantRecord);

    fn remove(&self, id: ParticipantId) -> Option<ParticipantRecord>;

    /// Create the record with `init` if it is absent, then mutate it in
    /// place. Both steps happen under one exclusion.
    fn update(
        &self,
        id: ParticipantId,
        init: &dyn Fn() -> ParticipantRecord,
        f: &mut dyn FnMut(&mut ParticipantRecord),
    );

    /// Copy of every record, sorted by id.
    fn entries(&self) -> Vec<(ParticipantId, ParticipantRecord)>;

    /// Swap the whole contents, e.g. after a load.
    fn replace_all(&self, records: Vec<(ParticipantId, ParticipantRecord)>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_create(
        &self,
        id: ParticipantId,
        init: &dyn Fn() -> ParticipantRecord,
    ) -> ParticipantRecord {
        let mut copy = ParticipantRecord::default();
        self.update(id, init, &mut |r| copy = r.clone());
        copy
    }
}

/// In-memory store behind a single mutex.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<ParticipantId, ParticipantRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: ParticipantId) -> Option<ParticipantRecord> {
        lock(&self.records).get(&id).cloned()
    }

    fn put(&self, id: ParticipantId, record: ParticipantRecord) {
        lock(&self.records).insert(id, record);
    }

    fn remove(&self, id: ParticipantId) -> Option<ParticipantRecord> {
        lock(&self.records).remove(&id)
    }

    fn update(
        &self,
        id: ParticipantId,
        init: &dyn Fn() -> ParticipantRecord,
        f: &mut dyn FnMut(&mut ParticipantRecord),
    ) {
        let mut records = lock(&self.records);
        f(records.entry(id).or_insert_with(init));
    }

    fn entries(&self) -> Vec<(ParticipantId, ParticipantRecord)> {
        let mut out: Vec<_> = lock(&self.records)
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    fn replace_all(&self, records: Vec<(ParticipantId, ParticipantRecord)>) {
        *lock(&self.records) = records.into_iter().collect();
    }

    fn len(&self) -> usize {
        lock(&self.records).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn id(n: u128) -> ParticipantId {
        ParticipantId::from_u128(n)
    }

    #[test]
    fn test_update_creates_with_init() {
        let store = MemoryRecordStore::new();
        assert!(store.is_empty());
        store.update(id(1), &|| ParticipantRecord::new(true), &mut |r| {
            r.cumulative_active_seconds += 5;
        });
        let r = store.get(id(1)).unwrap();
        assert!(r.manual_toggle);
        assert_eq!(r.cumulative_active_seconds, 5);
    }

    #[test]
    fn test_get_or_create_keeps_existing() {
        let store = MemoryRecordStore::new();
        store.put(
            id(1),
            ParticipantRecord {
                debt_seconds: 9,
                ..Default::default()
            },
        );
        let r = store.get_or_create(id(1), &|| ParticipantRecord::new(true));
        assert_eq!(r.debt_seconds, 9);
        assert!(!r.manual_toggle);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_entries_sorted_and_replace_all() {
        let store = MemoryRecordStore::new();
        for n in [3, 1, 2] {
            store.put(id(n), ParticipantRecord::default());
        }
        let ids: Vec<_> = store.entries().into_iter().map(|(i, _)| i).collect();
        assert_eq!(ids, vec![id(1), id(2), id(3)]);

        store.replace_all(vec![(id(7), ParticipantRecord::default())]);
        assert_eq!(store.len(), 1);
        assert!(store.get(id(1)).is_none());
        assert!(store.remove(id(7)).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_updates_do_not_interleave() {
        let store = Arc::new(MemoryRecordStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.update(id(1), &ParticipantRecord::default, &mut |r| {
                            r.cumulative_active_seconds += 1;
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get(id(1)).unwrap().cumulative_active_seconds, 8000);
    }
}
