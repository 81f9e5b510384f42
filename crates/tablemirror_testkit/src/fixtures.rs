//! Test fixtures and store helpers.

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::path::PathBuf;
use tablemirror_store::{Fields, SqliteStore};
use tablemirror_sync_engine::{ChangeSet, Page, RemoteRecord};
use tempfile::TempDir;

/// A SQLite-backed test store with automatic cleanup.
pub struct TestMirror {
    /// The store instance.
    pub store: SqliteStore,
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestMirror {
    /// Creates a new file-based store in a temporary directory.
    pub fn sqlite() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("mirror.db");
        let store = SqliteStore::open(&path).expect("Failed to open sqlite store");
        Self {
            store,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Returns a `sqlite:///` URL for the database file.
    pub fn url(&self) -> String {
        format!("sqlite:///{}", self.path.display())
    }

    /// Reopens the same database file.
    pub fn reopen(&self) -> SqliteStore {
        SqliteStore::open(&self.path).expect("Failed to reopen sqlite store")
    }
}

impl std::ops::Deref for TestMirror {
    type Target = SqliteStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Converts a JSON object literal into a field map.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("fields must be a JSON object, got {other}"),
    }
}

/// Builds a remote record with a `Name` field.
pub fn person(id: &str, name: &str) -> RemoteRecord {
    RemoteRecord::new(id, fields(json!({ "Name": name })))
}

/// Builds a page of records.
pub fn page(records: Vec<RemoteRecord>, next_cursor: Option<&str>) -> Page {
    Page::new(records, next_cursor.map(str::to_string))
}

/// Encodes records as an upstream list response body.
pub fn upstream_page_json(records: &[RemoteRecord], offset: Option<&str>) -> String {
    let records: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "fields": r.fields,
                "createdTime": "2024-01-01T00:00:00.000Z",
            })
        })
        .collect();
    let mut body = json!({ "records": records });
    if let Some(offset) = offset {
        body["offset"] = json!(offset);
    }
    body.to_string()
}

/// Builds a webhook notification body for `base_id`.
pub fn webhook_payload(base_id: &str, changes: &ChangeSet) -> Value {
    let mut payload = changes.to_payload();
    payload["base"] = json!({ "id": base_id });
    payload
}

/// Serializes a webhook notification body to raw bytes.
pub fn webhook_body(base_id: &str, changes: &ChangeSet) -> Vec<u8> {
    webhook_payload(base_id, changes).to_string().into_bytes()
}

/// Computes the webhook signature header for a delivery.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
