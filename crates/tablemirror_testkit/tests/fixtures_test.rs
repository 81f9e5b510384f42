//! Tests for testkit fixtures and generators.

use proptest::prelude::*;
use tablemirror_store::{MirrorStore, RecordQuery};
use tablemirror_sync_engine::apply_delta;
use tablemirror_testkit::prelude::*;

#[test]
fn sign_matches_vectors() {
    for vector in signature_vectors() {
        assert_eq!(
            sign(vector.secret, vector.timestamp, vector.body.as_bytes()),
            vector.expected_hex,
            "vector {}",
            vector.id
        );
    }
}

#[test]
fn reopened_mirror_sees_committed_records() {
    let mirror = TestMirror::sqlite();
    let changes = tablemirror_sync_engine::ChangeSet::new().added(
        "tbl",
        "rec1",
        fields(serde_json::json!({"a": 1})),
    );
    mirror.transaction(|txn| apply_delta(txn, &changes)).unwrap();

    let reopened = mirror.reopen();
    assert!(reopened.find_by_identity("rec1").unwrap().is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn generated_change_sets_apply_to_sqlite(changes in change_set_strategy()) {
        let mirror = TestMirror::sqlite();
        let outcome = mirror.transaction(|txn| apply_delta(txn, &changes)).unwrap();

        let records = mirror.list_records(&RecordQuery::new().with_limit(1000)).unwrap();
        prop_assert_eq!(records.len(), outcome.inserted - outcome.deleted);
    }
}
