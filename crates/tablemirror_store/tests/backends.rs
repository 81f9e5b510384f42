//! Behavior shared by every store backend.

use serde_json::json;
use tablemirror_store::{
    Fields, MemoryStore, MirrorStore, NewChangeEvent, NewRecord, RecordQuery, SqliteStore,
    StoreError, StoreResult,
};
use tempfile::TempDir;

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

fn insert(store: &impl MirrorStore, identity: &str, table: &str) {
    store
        .transaction(|txn| {
            txn.insert(NewRecord::new(identity, table, fields(json!({"id": identity}))))?;
            Ok(())
        })
        .unwrap();
}

fn check_crud(store: &impl MirrorStore) {
    insert(store, "rec1", "people");
    let record = store.find_by_identity("rec1").unwrap().unwrap();
    assert_eq!(record.source_table, "people");
    assert_eq!(record.fields, fields(json!({"id": "rec1"})));
    assert!(record.updated_at.is_none());

    let updated = store
        .transaction(|txn| txn.update_fields("rec1", fields(json!({"id": "rec1", "x": 2}))))
        .unwrap();
    assert!(updated);
    let record = store.find_by_identity("rec1").unwrap().unwrap();
    assert_eq!(record.fields["x"], json!(2));
    assert!(record.updated_at.unwrap() >= record.created_at);

    let deleted = store.transaction(|txn| txn.delete("rec1")).unwrap();
    assert!(deleted);
    assert!(store.find_by_identity("rec1").unwrap().is_none());
    assert_eq!(store.record_count().unwrap(), 0);
}

fn check_rollback(store: &impl MirrorStore) {
    insert(store, "keep", "people");

    let result: StoreResult<()> = store.transaction(|txn| {
        txn.insert(NewRecord::new("ghost", "people", Fields::new()))?;
        txn.update_fields("keep", fields(json!({"clobbered": true})))?;
        txn.insert_event(NewChangeEvent::new("evt", "app", json!({})))?;
        Err(StoreError::Corrupt("abort".into()))
    });
    assert!(result.is_err());

    assert!(store.find_by_identity("ghost").unwrap().is_none());
    let keep = store.find_by_identity("keep").unwrap().unwrap();
    assert_eq!(keep.fields, fields(json!({"id": "keep"})));
    assert!(store.list_events(10).unwrap().is_empty());
}

fn check_listing(store: &impl MirrorStore) {
    for (identity, table) in [("b", "people"), ("a", "tasks"), ("c", "people")] {
        insert(store, identity, table);
    }

    let all = store.list_records(&RecordQuery::new()).unwrap();
    let ids: Vec<_> = all.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);

    let by_name = store
        .list_records(&RecordQuery::new().with_sort("record_id", "ASC"))
        .unwrap();
    let ids: Vec<_> = by_name.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let people = store
        .list_records(&RecordQuery::new().with_table("people").with_limit(1))
        .unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].identity, "c");

    let fallback = store
        .list_records(&RecordQuery::new().with_sort("data", "desc").with_skip(1))
        .unwrap();
    let ids: Vec<_> = fallback.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

fn check_events(store: &impl MirrorStore) {
    let first = store
        .transaction(|txn| txn.insert_event(NewChangeEvent::new("1700000000_ab", "appX", json!({"a": 1}))))
        .unwrap();
    let again = store
        .transaction(|txn| txn.insert_event(NewChangeEvent::new("1700000000_ab", "appX", json!({"a": 1}))))
        .unwrap();
    assert!(!first.is_duplicate());
    assert!(again.is_duplicate());

    let events = store.list_events(10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source_identifier, "appX");
    assert_eq!(events[0].raw_payload, json!({"a": 1}));
    assert!(!events[0].processed);
}

#[test]
fn memory_backend() {
    check_crud(&MemoryStore::new());
    check_rollback(&MemoryStore::new());
    check_listing(&MemoryStore::new());
    check_events(&MemoryStore::new());
}

#[test]
fn sqlite_backend() {
    check_crud(&SqliteStore::open_in_memory().unwrap());
    check_rollback(&SqliteStore::open_in_memory().unwrap());
    check_listing(&SqliteStore::open_in_memory().unwrap());
    check_events(&SqliteStore::open_in_memory().unwrap());
}

#[test]
fn sqlite_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mirror.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        insert(&store, "rec1", "people");
    }

    let url = format!("sqlite:///{}", path.display());
    let store = SqliteStore::open_url(&url).unwrap();
    let record = store.find_by_identity("rec1").unwrap().unwrap();
    assert_eq!(record.id, 1);
    assert_eq!(record.source_table, "people");
}
