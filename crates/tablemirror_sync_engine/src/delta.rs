//! Webhook change notification model.
//!
//! A notification groups changes by upstream table:
//!
//! ```json
//! {
//!   "base": {"id": "appXXXX"},
//!   "changedTablesById": {
//!     "tblPeople": {
//!       "addedRecords":   [{"id": "rec1", "current": {"Name": "Ada"}}],
//!       "updatedRecords": [{"id": "rec2", "current": {"Name": "Grace"}}],
//!       "deletedRecords": ["rec3"]
//!     }
//!   }
//! }
//! ```

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tablemirror_store::Fields;

/// One added or updated record inside a change group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedRecord {
    /// Upstream identity.
    pub id: String,
    /// Full field payload after the change.
    #[serde(default)]
    pub current: Fields,
}

impl ChangedRecord {
    /// Creates a changed record.
    pub fn new(id: impl Into<String>, current: Fields) -> Self {
        Self {
            id: id.into(),
            current,
        }
    }
}

/// Changes for one upstream table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableChanges {
    /// Records created upstream.
    #[serde(default, rename = "addedRecords")]
    pub added: Vec<ChangedRecord>,
    /// Records whose fields changed upstream.
    #[serde(default, rename = "updatedRecords")]
    pub updated: Vec<ChangedRecord>,
    /// Identities removed upstream.
    #[serde(default, rename = "deletedRecords")]
    pub deleted: Vec<String>,
}

impl TableChanges {
    /// Returns true if the group carries no change.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// A decoded change notification: the delta for every touched table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Change groups keyed by upstream table identifier.
    #[serde(default, rename = "changedTablesById")]
    pub tables: BTreeMap<String, TableChanges>,
}

impl ChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the change groups of a notification body.
    ///
    /// A body without `changedTablesById` is an empty change set. Any group
    /// of the wrong shape rejects the whole notification.
    pub fn from_payload(payload: &Value) -> SyncResult<Self> {
        if !payload.is_object() {
            return Err(SyncError::InvalidPayload(
                "notification body must be a JSON object".into(),
            ));
        }
        Self::deserialize(payload).map_err(|e| SyncError::InvalidPayload(e.to_string()))
    }

    /// Encodes the change set as a notification body.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Adds an added record to `table`.
    pub fn added(mut self, table: &str, id: &str, current: Fields) -> Self {
        self.group(table).added.push(ChangedRecord::new(id, current));
        self
    }

    /// Adds an updated record to `table`.
    pub fn updated(mut self, table: &str, id: &str, current: Fields) -> Self {
        self.group(table).updated.push(ChangedRecord::new(id, current));
        self
    }

    /// Adds a deleted identity to `table`.
    pub fn deleted(mut self, table: &str, id: &str) -> Self {
        self.group(table).deleted.push(id.to_string());
        self
    }

    /// Returns true if no group carries a change.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(TableChanges::is_empty)
    }

    /// Total number of individual changes.
    pub fn change_count(&self) -> usize {
        self.tables
            .values()
            .map(|t| t.added.len() + t.updated.len() + t.deleted.len())
            .sum()
    }

    fn group(&mut self, table: &str) -> &mut TableChanges {
        self.tables.entry(table.to_string()).or_default()
    }
}
