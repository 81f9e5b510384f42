//! Record source abstraction.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tablemirror_store::Fields;

/// One record as reported by upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Upstream identity.
    pub id: String,
    /// Field payload.
    #[serde(default)]
    pub fields: Fields,
}

impl RemoteRecord {
    /// Creates a remote record.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// One page of upstream records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Records on this page.
    pub records: Vec<RemoteRecord>,
    /// Continuation token; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl Page {
    /// Creates a page.
    pub fn new(records: Vec<RemoteRecord>, next_cursor: Option<String>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    /// Returns true if no page follows this one.
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// A paginated source of upstream records.
///
/// This trait abstracts the upstream API, allowing for different
/// implementations (HTTP, mock for testing, etc.).
pub trait RecordSource: Send + Sync {
    /// Fetches one page of `table`, starting at `cursor` (`None` for the
    /// first page).
    fn fetch_page(&self, table: &str, cursor: Option<&str>) -> SyncResult<Page>;
}

/// A scripted record source for testing.
#[derive(Debug, Default)]
pub struct MockSource {
    pages: Mutex<VecDeque<SyncResult<Page>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockSource {
    /// Creates a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock source that replays `pages` in order.
    pub fn with_pages(pages: impl IntoIterator<Item = Page>) -> Self {
        let source = Self::new();
        for page in pages {
            source.push_page(page);
        }
        source
    }

    /// Queues a page.
    pub fn push_page(&self, page: Page) {
        self.pages.lock().push_back(Ok(page));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: SyncError) {
        self.pages.lock().push_back(Err(error));
    }

    /// Returns the `(table, cursor)` of every call so far.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().clone()
    }
}

impl RecordSource for MockSource {
    fn fetch_page(&self, table: &str, cursor: Option<&str>) -> SyncResult<Page> {
        self.calls
            .lock()
            .push((table.to_string(), cursor.map(str::to_string)));
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no mock page scripted".into())))
    }
}
