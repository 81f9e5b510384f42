//! Mirrored record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record's full field payload.
///
/// Replaced wholesale on update; there is no field-level merge.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The local copy of one upstream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    /// Local insertion identity (monotonic surrogate key).
    pub id: i64,
    /// Upstream-assigned identity, the reconciliation key.
    pub identity: String,
    /// Upstream table this record belongs to.
    pub source_table: String,
    /// The record payload.
    pub fields: Fields,
    /// Set once at first local insertion.
    pub created_at: DateTime<Utc>,
    /// Set whenever `fields` changes. `None` until the first change.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A record about to be inserted into the mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    /// Upstream-assigned identity.
    pub identity: String,
    /// Upstream table.
    pub source_table: String,
    /// The record payload.
    pub fields: Fields,
}

impl NewRecord {
    /// Creates a new record for insertion.
    pub fn new(identity: impl Into<String>, source_table: impl Into<String>, fields: Fields) -> Self {
        Self {
            identity: identity.into(),
            source_table: source_table.into(),
            fields,
        }
    }

    /// Materializes the record with its assigned local id.
    pub(crate) fn materialize(self, id: i64, created_at: DateTime<Utc>) -> MirrorRecord {
        MirrorRecord {
            id,
            identity: self.identity,
            source_table: self.source_table,
            fields: self.fields,
            created_at,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn materialize_keeps_payload() {
        let mut fields = Fields::new();
        fields.insert("Name".into(), json!("Ada"));

        let now = Utc::now();
        let record = NewRecord::new("rec1", "people", fields.clone()).materialize(7, now);

        assert_eq!(record.id, 7);
        assert_eq!(record.identity, "rec1");
        assert_eq!(record.source_table, "people");
        assert_eq!(record.fields, fields);
        assert_eq!(record.created_at, now);
        assert!(record.updated_at.is_none());
    }

    #[test]
    fn fields_compare_by_value() {
        let a: Fields = serde_json::from_str(r#"{"a":1,"b":[1,2]}"#).unwrap();
        let b: Fields = serde_json::from_str(r#"{"b":[1,2],"a":1}"#).unwrap();
        assert_eq!(a, b);
    }
}
