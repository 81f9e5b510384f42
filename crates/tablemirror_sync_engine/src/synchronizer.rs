//! Full-table synchronization.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconciler::Reconciler;
use crate::source::{RecordSource, RemoteRecord};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablemirror_store::MirrorStore;
use tracing::{info, warn};

/// Result of one table sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Table that was synced.
    pub table: String,
    /// Records fetched across all pages.
    pub records_seen: usize,
    /// Records newly inserted into the mirror.
    pub records_inserted: usize,
    /// Pages fetched.
    pub pages: u32,
    /// Wall time of fetch plus reconciliation.
    #[serde(skip)]
    pub duration: Duration,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Syncs that committed.
    pub syncs_completed: u64,
    /// Syncs that aborted.
    pub syncs_failed: u64,
    /// Records fetched by completed syncs.
    pub records_seen: u64,
    /// Records inserted by completed syncs.
    pub records_inserted: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Drives a [`RecordSource`] across every page of a table and reconciles the
/// result in full-sync mode.
pub struct Synchronizer<S: RecordSource, M: MirrorStore> {
    config: SyncConfig,
    source: Arc<S>,
    reconciler: Reconciler<M>,
    stats: RwLock<SyncStats>,
}

impl<S: RecordSource, M: MirrorStore> Synchronizer<S, M> {
    /// Creates a new synchronizer.
    pub fn new(config: SyncConfig, source: Arc<S>, store: Arc<M>) -> Self {
        Self {
            config,
            source,
            reconciler: Reconciler::new(store),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<M> {
        self.reconciler.store()
    }

    /// Returns the reconciler shared with the webhook path.
    pub fn reconciler(&self) -> &Reconciler<M> {
        &self.reconciler
    }

    /// Returns the record source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Mirrors every page of `table`.
    ///
    /// Nothing is written unless every page was fetched.
    pub fn sync_table(&self, table: &str) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let result = self.run(table, start);

        let mut stats = self.stats.write();
        match &result {
            Ok(report) => {
                stats.syncs_completed += 1;
                stats.records_seen += report.records_seen as u64;
                stats.records_inserted += report.records_inserted as u64;
            }
            Err(e) => {
                stats.syncs_failed += 1;
                stats.last_error = Some(e.to_string());
                warn!(table, error = %e, "sync aborted");
            }
        }
        result
    }

    fn run(&self, table: &str, start: Instant) -> SyncResult<SyncReport> {
        let (records, pages) = self.fetch_all(table)?;
        let outcome = self.reconciler.reconcile_full_sync(table, &records)?;

        let report = SyncReport {
            table: table.to_string(),
            records_seen: records.len(),
            records_inserted: outcome.inserted,
            pages,
            duration: start.elapsed(),
        };
        info!(
            table,
            pages,
            records_seen = report.records_seen,
            records_inserted = report.records_inserted,
            duration_ms = report.duration.as_millis() as u64,
            "sync completed"
        );
        Ok(report)
    }

    fn fetch_all(&self, table: &str) -> SyncResult<(Vec<RemoteRecord>, u32)> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            if pages >= self.config.max_pages {
                return Err(SyncError::PageLimitExceeded {
                    table: table.to_string(),
                    pages,
                });
            }

            let page = self.source.fetch_page(table, cursor.as_deref())?;
            pages += 1;
            records.extend(page.records);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok((records, pages)),
            }
        }
    }
}
