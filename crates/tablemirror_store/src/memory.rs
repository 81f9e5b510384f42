//! In-memory mirror store for testing.

use crate::error::{StoreError, StoreResult};
use crate::event::{ChangeEvent, EventInsert, NewChangeEvent};
use crate::query::RecordQuery;
use crate::record::{Fields, MirrorRecord, NewRecord};
use crate::store::{MirrorStore, MirrorTxn};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Records keyed by local id, so iteration is insertion order.
    records: BTreeMap<i64, MirrorRecord>,
    /// identity -> local id.
    by_identity: HashMap<String, i64>,
    events: Vec<ChangeEvent>,
    event_ids: HashSet<String>,
    last_record_id: i64,
    last_event_id: i64,
}

/// An in-memory mirror store.
///
/// This store keeps everything in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral mirrors that don't need persistence
///
/// # Transactions
///
/// A transaction works on a private copy of the state under the write lock
/// and swaps it in on success, so writers are serialized and a failed
/// transaction leaves no trace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored change events.
    pub fn event_count(&self) -> usize {
        self.state.read().events.len()
    }
}

impl MirrorStore for MemoryStore {
    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<MirrorRecord>> {
        Ok(self.state.read().find(identity).cloned())
    }

    fn list_records(&self, query: &RecordQuery) -> StoreResult<Vec<MirrorRecord>> {
        let state = self.state.read();
        let mut matching: Vec<&MirrorRecord> =
            state.records.values().filter(|r| query.matches(r)).collect();
        matching.sort_by(|a, b| query.compare(a, b));

        Ok(matching
            .into_iter()
            .skip(query.skip)
            .take(query.limit)
            .cloned()
            .collect())
    }

    fn list_events(&self, limit: usize) -> StoreResult<Vec<ChangeEvent>> {
        Ok(self
            .state
            .read()
            .events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn record_count(&self) -> StoreResult<usize> {
        Ok(self.state.read().records.len())
    }

    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn MirrorTxn) -> StoreResult<T>,
    {
        let mut guard = self.state.write();
        let mut staged = guard.clone();
        let out = f(&mut MemoryTxn {
            state: &mut staged,
        })?;
        *guard = staged;
        Ok(out)
    }
}

impl MemoryState {
    fn find(&self, identity: &str) -> Option<&MirrorRecord> {
        self.by_identity
            .get(identity)
            .and_then(|id| self.records.get(id))
    }
}

struct MemoryTxn<'a> {
    state: &'a mut MemoryState,
}

impl MirrorTxn for MemoryTxn<'_> {
    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<MirrorRecord>> {
        Ok(self.state.find(identity).cloned())
    }

    fn insert(&mut self, record: NewRecord) -> StoreResult<MirrorRecord> {
        if self.state.by_identity.contains_key(&record.identity) {
            return Err(StoreError::DuplicateIdentity {
                identity: record.identity,
            });
        }

        self.state.last_record_id += 1;
        let id = self.state.last_record_id;
        let record = record.materialize(id, Utc::now());

        self.state.by_identity.insert(record.identity.clone(), id);
        self.state.records.insert(id, record.clone());
        Ok(record)
    }

    fn update_fields(&mut self, identity: &str, fields: Fields) -> StoreResult<bool> {
        let Some(id) = self.state.by_identity.get(identity) else {
            return Ok(false);
        };
        match self.state.records.get_mut(id) {
            Some(record) => {
                record.fields = fields;
                record.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Err(StoreError::Corrupt(format!(
                "identity index points at missing row {id}"
            ))),
        }
    }

    fn delete(&mut self, identity: &str) -> StoreResult<bool> {
        match self.state.by_identity.remove(identity) {
            Some(id) => {
                self.state.records.remove(&id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_event(&mut self, event: NewChangeEvent) -> StoreResult<EventInsert> {
        if !self.state.event_ids.insert(event.event_id.clone()) {
            return Ok(EventInsert::Duplicate);
        }

        self.state.last_event_id += 1;
        let event = event.materialize(self.state.last_event_id, Utc::now());
        self.state.events.push(event.clone());
        Ok(EventInsert::Inserted(event))
    }
}
