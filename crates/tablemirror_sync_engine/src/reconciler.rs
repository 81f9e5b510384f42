//! Convergence of remote changes onto the mirror.
//!
//! Two modes share one lookup-then-write core but stay distinct: full sync is
//! additive (never updates or deletes), webhook deltas may do all three.

use crate::delta::ChangeSet;
use crate::error::SyncResult;
use crate::source::RemoteRecord;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tablemirror_store::{MirrorStore, MirrorTxn, NewRecord, StoreResult};
use tracing::{debug, info};

/// Which path produced a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationMode {
    /// Insert unseen identities, leave known ones untouched.
    FullSyncAdditive,
    /// Apply added/updated/deleted groups from a webhook.
    IncrementalDelta,
}

impl fmt::Display for ReconciliationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationMode::FullSyncAdditive => write!(f, "full_sync_additive"),
            ReconciliationMode::IncrementalDelta => write!(f, "incremental_delta"),
        }
    }
}

/// Counts of what one reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Reconciliation path.
    pub mode: ReconciliationMode,
    /// Records inserted.
    pub inserted: usize,
    /// Records whose fields were overwritten.
    pub updated: usize,
    /// Records removed.
    pub deleted: usize,
    /// Known records left as they were.
    pub unchanged: usize,
    /// Updates or deletes for identities not in the mirror.
    pub skipped: usize,
}

impl ReconcileOutcome {
    /// Creates an empty outcome.
    pub fn new(mode: ReconciliationMode) -> Self {
        Self {
            mode,
            inserted: 0,
            updated: 0,
            deleted: 0,
            unchanged: 0,
            skipped: 0,
        }
    }

    /// Number of writes performed.
    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Inserts every record of `records` whose identity is not yet mirrored.
pub fn apply_full_sync(
    txn: &mut dyn MirrorTxn,
    table: &str,
    records: &[RemoteRecord],
) -> StoreResult<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::new(ReconciliationMode::FullSyncAdditive);

    for record in records {
        if txn.find_by_identity(&record.id)?.is_some() {
            outcome.unchanged += 1;
            continue;
        }
        txn.insert(NewRecord::new(&record.id, table, record.fields.clone()))?;
        outcome.inserted += 1;
    }

    Ok(outcome)
}

/// Applies every change group of `changes`.
///
/// Per table: added, then updated, then deleted. Added identities already
/// present are left alone; updates and deletes for unknown identities are
/// dropped; an update whose fields equal the stored fields writes nothing.
pub fn apply_delta(txn: &mut dyn MirrorTxn, changes: &ChangeSet) -> StoreResult<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::new(ReconciliationMode::IncrementalDelta);

    for (table, group) in &changes.tables {
        for record in &group.added {
            if txn.find_by_identity(&record.id)?.is_some() {
                outcome.unchanged += 1;
            } else {
                txn.insert(NewRecord::new(&record.id, table, record.current.clone()))?;
                outcome.inserted += 1;
            }
        }

        for record in &group.updated {
            match txn.find_by_identity(&record.id)? {
                Some(existing) if existing.fields == record.current => outcome.unchanged += 1,
                Some(_) => {
                    txn.update_fields(&record.id, record.current.clone())?;
                    outcome.updated += 1;
                }
                None => {
                    debug!(table = %table, identity = %record.id, "dropping update for unknown record");
                    outcome.skipped += 1;
                }
            }
        }

        for identity in &group.deleted {
            if txn.delete(identity)? {
                outcome.deleted += 1;
            } else {
                outcome.skipped += 1;
            }
        }
    }

    Ok(outcome)
}

/// Runs reconciliations against a store, one transaction each.
pub struct Reconciler<M: MirrorStore> {
    store: Arc<M>,
}

impl<M: MirrorStore> Clone for Reconciler<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<M: MirrorStore> Reconciler<M> {
    /// Creates a reconciler over `store`.
    pub fn new(store: Arc<M>) -> Self {
        Self { store }
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<M> {
        &self.store
    }

    /// Full-sync reconciliation of one table's records.
    pub fn reconcile_full_sync(
        &self,
        table: &str,
        records: &[RemoteRecord],
    ) -> SyncResult<ReconcileOutcome> {
        let outcome = self
            .store
            .transaction(|txn| apply_full_sync(txn, table, records))?;
        info!(
            mode = %outcome.mode,
            table,
            inserted = outcome.inserted,
            unchanged = outcome.unchanged,
            "reconciled"
        );
        Ok(outcome)
    }

    /// Delta reconciliation of one change notification.
    pub fn reconcile(&self, changes: &ChangeSet) -> SyncResult<ReconcileOutcome> {
        let outcome = self.store.transaction(|txn| apply_delta(txn, changes))?;
        info!(
            mode = %outcome.mode,
            tables = changes.tables.len(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            deleted = outcome.deleted,
            skipped = outcome.skipped,
            "reconciled"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tablemirror_store::{Fields, MemoryStore, RecordQuery, StoreError};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn remote(id: &str, value: Value) -> RemoteRecord {
        RemoteRecord::new(id, fields(value))
    }

    fn reconciler() -> Reconciler<MemoryStore> {
        Reconciler::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn full_sync_inserts_only_new_identities() {
        let reconciler = reconciler();
        reconciler
            .reconcile_full_sync("people", &[remote("rec1", json!({"Name": "Ada"}))])
            .unwrap();

        let outcome = reconciler
            .reconcile_full_sync(
                "people",
                &[
                    remote("rec1", json!({"Name": "Changed"})),
                    remote("rec2", json!({"Name": "Grace"})),
                ],
            )
            .unwrap();

        assert_eq!(outcome.mode, ReconciliationMode::FullSyncAdditive);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.unchanged, 1);

        let rec1 = reconciler.store().find_by_identity("rec1").unwrap().unwrap();
        assert_eq!(rec1.fields["Name"], "Ada");
        assert!(rec1.updated_at.is_none());
        assert_eq!(reconciler.store().record_count().unwrap(), 2);
    }

    #[test]
    fn full_sync_dedupes_within_batch() {
        let reconciler = reconciler();
        let outcome = reconciler
            .reconcile_full_sync(
                "people",
                &[remote("rec1", json!({})), remote("rec1", json!({"x": 1}))],
            )
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.unchanged, 1);
    }

    #[test]
    fn delta_applies_groups_in_order() {
        let reconciler = reconciler();
        // added then deleted in the same group ends absent
        let changes = ChangeSet::new()
            .added("tblA", "rec1", fields(json!({"v": 1})))
            .updated("tblA", "rec1", fields(json!({"v": 2})))
            .deleted("tblA", "rec1")
            .added("tblB", "rec2", fields(json!({"v": 3})));

        let outcome = reconciler.reconcile(&changes).unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.deleted, 1);

        let store = reconciler.store();
        assert!(store.find_by_identity("rec1").unwrap().is_none());
        let rec2 = store.find_by_identity("rec2").unwrap().unwrap();
        assert_eq!(rec2.source_table, "tblB");
    }

    #[test]
    fn delta_is_idempotent() {
        let reconciler = reconciler();
        reconciler
            .reconcile_full_sync("tbl", &[remote("keep", json!({"v": 0})), remote("gone", json!({}))])
            .unwrap();

        let changes = ChangeSet::new()
            .added("tbl", "new", fields(json!({"v": 1})))
            .updated("tbl", "keep", fields(json!({"v": 9})))
            .deleted("tbl", "gone");

        reconciler.reconcile(&changes).unwrap();
        let once = reconciler.store().list_records(&RecordQuery::new()).unwrap();

        let second = reconciler.reconcile(&changes).unwrap();
        let twice = reconciler.store().list_records(&RecordQuery::new()).unwrap();

        assert_eq!(once, twice);
        assert_eq!(second.writes(), 0);
    }

    #[test]
    fn equal_update_leaves_updated_at_unchanged() {
        let reconciler = reconciler();
        reconciler
            .reconcile_full_sync("tbl", &[remote("rec1", json!({"a": [1, 2], "b": {"c": true}}))])
            .unwrap();

        let outcome = reconciler
            .reconcile(&ChangeSet::new().updated(
                "tbl",
                "rec1",
                fields(json!({"b": {"c": true}, "a": [1, 2]})),
            ))
            .unwrap();

        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.unchanged, 1);
        let rec1 = reconciler.store().find_by_identity("rec1").unwrap().unwrap();
        assert!(rec1.updated_at.is_none());
    }

    #[test]
    fn changed_update_overwrites_wholesale() {
        let reconciler = reconciler();
        reconciler
            .reconcile_full_sync("tbl", &[remote("rec1", json!({"a": 1, "b": 2}))])
            .unwrap();
        reconciler
            .reconcile(&ChangeSet::new().updated("tbl", "rec1", fields(json!({"a": 5}))))
            .unwrap();

        let rec1 = reconciler.store().find_by_identity("rec1").unwrap().unwrap();
        assert_eq!(rec1.fields, fields(json!({"a": 5})));
        assert!(rec1.updated_at.is_some());
    }

    #[test]
    fn unknown_update_and_delete_are_dropped() {
        let reconciler = reconciler();
        let outcome = reconciler
            .reconcile(
                &ChangeSet::new()
                    .updated("tbl", "ghost", fields(json!({"a": 1})))
                    .deleted("tbl", "phantom"),
            )
            .unwrap();

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.writes(), 0);
        assert_eq!(reconciler.store().record_count().unwrap(), 0);
    }

    #[test]
    fn failed_transaction_persists_nothing() {
        let store = MemoryStore::new();
        let changes = ChangeSet::new().added("tbl", "rec1", Fields::new());

        let result: StoreResult<()> = store.transaction(|txn| {
            apply_delta(txn, &changes)?;
            Err(StoreError::Corrupt("abort".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.record_count().unwrap(), 0);
    }
}
