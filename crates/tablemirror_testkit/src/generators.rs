//! Property-based test generators using proptest.
//!
//! Identities are drawn from a small pool per table so generated deltas
//! collide with each other and with seeded records, while an identity never
//! appears under two tables.

use proptest::prelude::*;
use serde_json::Value;
use tablemirror_store::Fields;
use tablemirror_sync_engine::{ChangeSet, ChangedRecord, RemoteRecord, TableChanges};

const TABLES: [&str; 3] = ["tblPeople", "tblTasks", "tblNotes"];

/// Strategy for upstream table identifiers.
pub fn table_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(TABLES.to_vec()).prop_map(str::to_string)
}

/// Strategy for identities belonging to `table`.
pub fn table_identity_strategy(table: &str) -> impl Strategy<Value = String> {
    let prefix = table.trim_start_matches("tbl").to_string();
    (0u8..8).prop_map(move |n| format!("rec{prefix}{n:02}"))
}

/// Strategy for identities from any table's pool.
pub fn identity_strategy() -> impl Strategy<Value = String> {
    table_strategy().prop_flat_map(|table| table_identity_strategy(&table))
}

/// Strategy for scalar JSON field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
    ]
}

/// Strategy for a record's field map.
pub fn fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map("[A-Z][a-z]{0,5}", field_value_strategy(), 0..4)
        .prop_map(|map| map.into_iter().collect())
}

fn changed_record_strategy(table: &str) -> impl Strategy<Value = ChangedRecord> {
    (table_identity_strategy(table), fields_strategy())
        .prop_map(|(id, current)| ChangedRecord::new(id, current))
}

/// Strategy for one table's change group.
pub fn table_changes_strategy(table: &str) -> impl Strategy<Value = TableChanges> {
    (
        prop::collection::vec(changed_record_strategy(table), 0..5),
        prop::collection::vec(changed_record_strategy(table), 0..5),
        prop::collection::vec(table_identity_strategy(table), 0..4),
    )
        .prop_map(|(added, updated, deleted)| TableChanges {
            added,
            updated,
            deleted,
        })
}

/// Strategy for a whole change notification.
pub fn change_set_strategy() -> impl Strategy<Value = ChangeSet> {
    prop::sample::subsequence(TABLES.to_vec(), 0..=TABLES.len())
        .prop_flat_map(|tables| {
            tables
                .into_iter()
                .map(|table| table_changes_strategy(table).prop_map(move |c| (table.to_string(), c)))
                .collect::<Vec<_>>()
        })
        .prop_map(|groups| ChangeSet {
            tables: groups.into_iter().collect(),
        })
}

/// Strategy for a batch of fetched records.
pub fn remote_records_strategy() -> impl Strategy<Value = Vec<RemoteRecord>> {
    prop::collection::vec(
        (identity_strategy(), fields_strategy()).prop_map(|(id, f)| RemoteRecord::new(id, f)),
        0..10,
    )
}
