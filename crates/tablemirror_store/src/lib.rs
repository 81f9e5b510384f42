//! # tablemirror store
//!
//! Persisted entities and store backends for the tablemirror service.
//!
//! This crate provides:
//! - [`MirrorRecord`] - the local copy of one upstream record
//! - [`ChangeEvent`] - the append-only webhook audit log
//! - [`RecordQuery`] - filter, sort and paging for record listings
//! - [`MirrorStore`] / [`MirrorTxn`] - the capability interface the
//!   reconciler writes through
//!
//! ## Available Backends
//!
//! - [`MemoryStore`] - For testing and ephemeral mirrors
//! - [`SqliteStore`] - For persistent mirrors backed by SQLite
//!
//! ## Key Invariants
//!
//! - Exactly one record per `identity` exists at any time
//! - A transaction either commits every write or none of them
//! - Change events are never mutated or deleted
//!
//! ## Example
//!
//! ```rust
//! use tablemirror_store::{MemoryStore, MirrorStore, NewRecord};
//!
//! let store = MemoryStore::new();
//! store
//!     .transaction(|txn| {
//!         txn.insert(NewRecord::new("rec1", "people", Default::default()))?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert!(store.find_by_identity("rec1").unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod event;
mod memory;
mod query;
mod record;
mod sqlite;
mod store;

pub use error::{StoreError, StoreResult};
pub use event::{ChangeEvent, EventInsert, NewChangeEvent};
pub use memory::MemoryStore;
pub use query::{RecordQuery, RecordSort, SortDirection, SortField};
pub use record::{Fields, MirrorRecord, NewRecord};
pub use sqlite::SqliteStore;
pub use store::{MirrorStore, MirrorTxn};
