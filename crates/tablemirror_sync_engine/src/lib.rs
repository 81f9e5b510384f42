//! # tablemirror sync engine
//!
//! Fetches a paginated upstream table and converges the local mirror on it.
//!
//! This crate provides:
//! - Remote fetch client with bounded exponential backoff
//! - HTTP client abstraction (ureq in production, scripted in tests)
//! - Webhook delta model ([`ChangeSet`])
//! - The reconciler shared by full sync and webhook deltas
//! - The table synchronizer
//!
//! ## Architecture
//!
//! ```text
//! Synchronizer -> RecordSource (FetchClient) -> pages -> Reconciler -> MirrorStore
//! webhook body -> ChangeSet --------------------------> Reconciler -> MirrorStore
//! ```
//!
//! ## Key Invariants
//!
//! - Full sync only inserts; it never updates or deletes
//! - Applying the same delta twice has no additional effect
//! - Every reconciliation commits as one store transaction
//! - Reconciliation runs only after every page was fetched

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod delta;
mod error;
mod fetch;
mod http;
mod reconciler;
mod retry;
mod source;
mod synchronizer;

pub use config::{FetchConfig, RetryConfig, SyncConfig};
pub use delta::{ChangeSet, ChangedRecord, TableChanges};
pub use error::{SyncError, SyncResult};
pub use fetch::FetchClient;
pub use http::{HttpClient, HttpResponse, RecordedRequest, ScriptedClient, UreqClient};
pub use reconciler::{apply_delta, apply_full_sync, ReconcileOutcome, ReconciliationMode, Reconciler};
pub use retry::{with_backoff, RecordingSleeper, Sleeper, ThreadSleeper};
pub use source::{MockSource, Page, RecordSource, RemoteRecord};
pub use synchronizer::{SyncReport, SyncStats, Synchronizer};
