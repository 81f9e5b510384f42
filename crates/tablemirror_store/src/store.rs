//! Store capability traits.

use crate::error::StoreResult;
use crate::event::{ChangeEvent, EventInsert, NewChangeEvent};
use crate::query::RecordQuery;
use crate::record::{Fields, MirrorRecord, NewRecord};

/// Writes available inside one store transaction.
///
/// Every reconciler call site goes through this trait, so a stricter backend
/// can add concurrency tokens or row locks without touching the reconciler.
///
/// # Invariants
///
/// - Reads observe writes made earlier in the same transaction
/// - Nothing is visible outside the transaction until it commits
pub trait MirrorTxn {
    /// Looks up a record by upstream identity.
    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<MirrorRecord>>;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::DuplicateIdentity`] if the identity exists.
    fn insert(&mut self, record: NewRecord) -> StoreResult<MirrorRecord>;

    /// Replaces a record's fields and stamps `updated_at`.
    ///
    /// Returns false if no record has this identity.
    fn update_fields(&mut self, identity: &str, fields: Fields) -> StoreResult<bool>;

    /// Removes a record.
    ///
    /// Returns false if no record has this identity.
    fn delete(&mut self, identity: &str) -> StoreResult<bool>;

    /// Appends a change event unless its `event_id` was already stored.
    fn insert_event(&mut self, event: NewChangeEvent) -> StoreResult<EventInsert>;
}

/// A persisted mirror.
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing
/// - [`super::SqliteStore`] - For persistent storage
pub trait MirrorStore: Send + Sync {
    /// Looks up a committed record by upstream identity.
    fn find_by_identity(&self, identity: &str) -> StoreResult<Option<MirrorRecord>>;

    /// Lists committed records.
    fn list_records(&self, query: &RecordQuery) -> StoreResult<Vec<MirrorRecord>>;

    /// Lists the most recent change events, newest first.
    fn list_events(&self, limit: usize) -> StoreResult<Vec<ChangeEvent>>;

    /// Returns the number of committed records.
    fn record_count(&self) -> StoreResult<usize>;

    /// Runs `f` as one unit of work.
    ///
    /// All writes made through the transaction commit together when `f`
    /// returns `Ok`; if `f` returns `Err` none of them persist.
    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn MirrorTxn) -> StoreResult<T>;
}
