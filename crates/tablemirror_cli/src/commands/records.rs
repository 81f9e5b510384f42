//! Record and event listing commands.

use clap::Args;
use tablemirror_sync_server::{ApiRequest, Method};

/// Paging flags shared by the listing commands.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    /// Records to skip
    #[arg(long)]
    pub skip: Option<usize>,

    /// Maximum records to return (1-1000)
    #[arg(short, long)]
    pub limit: Option<usize>,
}

impl ListArgs {
    fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(skip) = self.skip {
            request = request.with_query("skip", skip.to_string());
        }
        if let Some(limit) = self.limit {
            request = request.with_query("limit", limit.to_string());
        }
        request
    }
}

/// Builds a record listing request.
pub fn list_request(
    table: Option<&str>,
    list: &ListArgs,
    sort_by: Option<&str>,
    sort_order: Option<&str>,
) -> ApiRequest {
    let mut request = list.apply(ApiRequest::get("/api/v1/records"));
    if let Some(table) = table {
        request = request.with_query("table_name", table);
    }
    if let Some(sort_by) = sort_by {
        request = request.with_query("sort_by", sort_by);
    }
    if let Some(sort_order) = sort_order {
        request = request.with_query("sort_order", sort_order);
    }
    request
}

/// Builds a convenience listing request for `table`.
pub fn table_request(table: &str, list: &ListArgs) -> ApiRequest {
    list.apply(ApiRequest::from_segments(Method::Get, ["api", "v1", table]))
}

/// Builds a single-record lookup.
pub fn record_request(id: &str) -> ApiRequest {
    ApiRequest::from_segments(Method::Get, ["api", "v1", "records", id])
}

/// Builds an event listing request.
pub fn events_request(limit: Option<usize>) -> ApiRequest {
    let request = ApiRequest::get("/api/v1/events");
    match limit {
        Some(limit) => request.with_query("limit", limit.to_string()),
        None => request,
    }
}
