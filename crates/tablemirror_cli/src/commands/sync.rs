//! Sync command implementation.

use tablemirror_sync_server::{ApiRequest, Method};

/// Builds the request that mirrors `table`.
pub fn request(table: &str) -> ApiRequest {
    ApiRequest::from_segments(Method::Post, ["api", "v1", "sync", table])
}
