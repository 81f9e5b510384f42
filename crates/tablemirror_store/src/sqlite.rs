//! SQLite-backed mirror store.

use crate::error::{StoreError, StoreResult};
use crate::event::{ChangeEvent, EventInsert, NewChangeEvent};
use crate::query::RecordQuery;
use crate::record::{Fields, MirrorRecord, NewRecord};
use crate::store::{MirrorStore, MirrorTxn};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS mirror_records (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  table_name TEXT NOT NULL,
  record_id TEXT NOT NULL UNIQUE,
  data TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT
);

CREATE TABLE IF NOT EXISTS change_events (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  event_id TEXT NOT NULL UNIQUE,
  source_identifier TEXT NOT NULL,
  payload TEXT NOT NULL,
  received_at TEXT NOT NULL,
  processed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_mirror_records_table ON mirror_records(table_name);
CREATE INDEX IF NOT EXISTS idx_change_events_source ON change_events(source_identifier);
";

const RECORD_COLUMNS: &str = "id, record_id, table_name, data, created_at, updated_at";

type RecordRow = (i64, String, String, String, String, Option<String>);
type EventRow = (i64, String, String, String, String, i64);

/// A mirror store persisted in SQLite.
///
/// One connection guarded by a mutex; each [`MirrorStore::transaction`]
/// runs inside a SQLite transaction that rolls back when dropped uncommitted.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given file path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened sqlite mirror");
        Self::from_connection(conn)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Opens a store from a database URL.
    ///
    /// Accepts `sqlite:///path`, `sqlite://:memory:`, `sqlite::memory:`,
    /// `:memory:` or a bare path.
    pub fn open_url(url: &str) -> StoreResult<Self> {
        match parse_database_url(url)? {
            None => Self::open_in_memory(),
            Some(path) => Self::open(path),
        }
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Resolves a database URL to a file path, or `None` for in-memory.
fn parse_database_url(url: &str) -> StoreResult<Option<&str>> {
    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        // sqlite:///./file.db -> ./file.db, sqlite:////abs/file.db -> /abs/file.db
        match rest.strip_prefix('/') {
            Some(path) if !path.is_empty() => path,
            _ => rest,
        }
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.contains("://") {
        return Err(StoreError::InvalidUrl(url.to_string()));
    } else {
        url
    };

    match path {
        "" => Err(StoreError::InvalidUrl(url.to_string())),
        ":memory:" => Ok(None),
        path => Ok(Some(path)),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn decode_record(row: RecordRow) -> StoreResult<MirrorRecord> {
    let (id, identity, source_table, data, created_at, updated_at) = row;
    let fields: Fields = serde_json::from_str(&data)?;
    Ok(MirrorRecord {
        id,
        identity,
        source_table,
        fields,
        created_at: parse_timestamp(&created_at)?,
        updated_at: updated_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn decode_event(row: EventRow) -> StoreResult<ChangeEvent> {
    let (id, event_id, source_identifier, payload, received_at, processed) = row;
    Ok(ChangeEvent {
        id,
        event_id,
        source_identifier,
        raw_payload: serde_json::from_str(&payload)?,
        received_at: parse_timestamp(&received_at)?,
        processed: processed != 0,
    })
}

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn find_record(conn: &Connection, identity: &str) -> StoreResult<Option<MirrorRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM mirror_records WHERE record_id = ?1");
    conn.query_row(&sql, params![identity], record_row)
        .optional()?
        .map(decode_record)
        .transpose()
}

impl MirrorStore for SqliteStore {
    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<MirrorRecord>> {
        find_record(&self.conn.lock(), identity)
    }

    fn list_records(&self, query: &RecordQuery) -> StoreResult<Vec<MirrorRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM mirror_records \
             WHERE (?1 IS NULL OR table_name = ?1) {} LIMIT ?2 OFFSET ?3",
            query.order_by_sql()
        );
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.skip).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![query.table, limit, offset], record_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode_record).collect()
    }

    fn list_events(&self, limit: usize) -> StoreResult<Vec<ChangeEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, event_id, source_identifier, payload, received_at, processed \
             FROM change_events ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<Result<Vec<EventRow>, _>>()?;
        rows.into_iter().map(decode_event).collect()
    }

    fn record_count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM mirror_records", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count {count}")))
    }

    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn MirrorTxn) -> StoreResult<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        // Dropping `tx` without commit rolls back.
        let out = f(&mut SqliteTxn { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }
}

struct SqliteTxn<'a> {
    conn: &'a Connection,
}

impl MirrorTxn for SqliteTxn<'_> {
    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<MirrorRecord>> {
        find_record(self.conn, identity)
    }

    fn insert(&mut self, record: NewRecord) -> StoreResult<MirrorRecord> {
        if find_record(self.conn, &record.identity)?.is_some() {
            return Err(StoreError::DuplicateIdentity {
                identity: record.identity,
            });
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO mirror_records (table_name, record_id, data, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.source_table,
                record.identity,
                serde_json::to_string(&record.fields)?,
                timestamp(now)
            ],
        )?;
        Ok(record.materialize(self.conn.last_insert_rowid(), now))
    }

    fn update_fields(&mut self, identity: &str, fields: Fields) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE mirror_records SET data = ?1, updated_at = ?2 WHERE record_id = ?3",
            params![serde_json::to_string(&fields)?, timestamp(Utc::now()), identity],
        )?;
        Ok(changed > 0)
    }

    fn delete(&mut self, identity: &str) -> StoreResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM mirror_records WHERE record_id = ?1", params![identity])?;
        Ok(changed > 0)
    }

    fn insert_event(&mut self, event: NewChangeEvent) -> StoreResult<EventInsert> {
        let now = Utc::now();
        let changed = self.conn.execute(
            "INSERT INTO change_events (event_id, source_identifier, payload, received_at, processed) \
             VALUES (?1, ?2, ?3, ?4, 0) ON CONFLICT(event_id) DO NOTHING",
            params![
                event.event_id,
                event.source_identifier,
                serde_json::to_string(&event.raw_payload)?,
                timestamp(now)
            ],
        )?;

        if changed == 0 {
            return Ok(EventInsert::Duplicate);
        }
        Ok(EventInsert::Inserted(
            event.materialize(self.conn.last_insert_rowid(), now),
        ))
    }
}
