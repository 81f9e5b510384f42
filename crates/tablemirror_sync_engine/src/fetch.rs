//! Remote fetch client for the upstream tabular API.

use crate::config::FetchConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpResponse, UreqClient};
use crate::retry::{with_backoff, Sleeper, ThreadSleeper};
use crate::source::{Page, RecordSource, RemoteRecord};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Longest body excerpt carried in an upstream error.
const ERROR_EXCERPT_LEN: usize = 200;

/// Wire shape of one list response.
#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<RemoteRecord>,
    #[serde(default)]
    offset: Option<String>,
}

/// Fetches pages of a table from the upstream API.
///
/// Authenticates with a bearer token, treats HTTP 429 and network failures as
/// transient, and retries them with the configured backoff.
pub struct FetchClient<C: HttpClient> {
    config: FetchConfig,
    client: C,
    sleeper: Arc<dyn Sleeper>,
}

impl FetchClient<UreqClient> {
    /// Creates a client that talks to upstream over `ureq`.
    pub fn over_http(config: FetchConfig) -> Self {
        let client = UreqClient::new(config.timeout);
        Self::new(config, client)
    }
}

impl<C: HttpClient> FetchClient<C> {
    /// Creates a new fetch client.
    pub fn new(config: FetchConfig, client: C) -> Self {
        Self {
            config,
            client,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replaces the sleeper used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.config.base_url(), encode_path_segment(table))
    }

    /// Issues exactly one request.
    fn fetch_once(&self, url: &str, cursor: Option<&str>) -> SyncResult<Page> {
        let mut query = Vec::new();
        if let Some(cursor) = cursor {
            query.push(("offset", cursor));
        }
        let authorization = format!("Bearer {}", self.config.api_key);
        let headers = [
            ("Authorization", authorization.as_str()),
            ("Content-Type", "application/json"),
        ];

        let response = self
            .client
            .get(url, &query, &headers)
            .map_err(SyncError::transport_retryable)?;

        match response.status {
            200..=299 => decode_page(&response),
            429 => {
                warn!(url, retry_after = ?response.retry_after, "rate limit hit");
                Err(SyncError::RateLimited {
                    retry_after: response.retry_after,
                })
            }
            status => Err(SyncError::Upstream {
                status,
                message: excerpt(&response.body),
            }),
        }
    }
}

impl<C: HttpClient> RecordSource for FetchClient<C> {
    fn fetch_page(&self, table: &str, cursor: Option<&str>) -> SyncResult<Page> {
        if table.trim().is_empty() {
            return Err(SyncError::InvalidTable(table.to_string()));
        }

        let url = self.table_url(table);
        let page = with_backoff("fetch_page", &self.config.retry, self.sleeper.as_ref(), |_| {
            self.fetch_once(&url, cursor)
        })?;

        info!(
            table,
            records = page.records.len(),
            cursor = cursor.unwrap_or(""),
            next_cursor = page.next_cursor.as_deref().unwrap_or(""),
            "fetched batch"
        );
        Ok(page)
    }
}

fn decode_page(response: &HttpResponse) -> SyncResult<Page> {
    let body: ListResponse = serde_json::from_str(&response.body)
        .map_err(|e| SyncError::Protocol(format!("failed to decode page: {e}")))?;
    // An empty offset marks the last page just like a missing one.
    let next_cursor = body.offset.filter(|offset| !offset.is_empty());
    Ok(Page::new(body.records, next_cursor))
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(ERROR_EXCERPT_LEN) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

/// Percent-encodes a table name for use as one URL path segment.
fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(char::from(byte));
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::http::ScriptedClient;
    use crate::retry::RecordingSleeper;
    use std::time::Duration;

    fn client_with(responses: Vec<HttpResponse>) -> (FetchClient<ScriptedClient>, Arc<RecordingSleeper>) {
        let scripted = ScriptedClient::new();
        for response in responses {
            scripted.push_response(response);
        }
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = FetchClient::new(FetchConfig::new("appBASE", "keySECRET"), scripted)
            .with_sleeper(sleeper.clone());
        (client, sleeper)
    }

    #[test]
    fn fetches_page_with_auth_and_cursor() {
        let (client, _) = client_with(vec![HttpResponse::ok(
            r#"{"records":[{"id":"rec1","fields":{"Name":"Ada"},"createdTime":"2024-01-01T00:00:00.000Z"}],"offset":"itrNEXT"}"#,
        )]);

        let page = client.fetch_page("People", Some("itrPREV")).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "rec1");
        assert_eq!(page.records[0].fields["Name"], "Ada");
        assert_eq!(page.next_cursor.as_deref(), Some("itrNEXT"));

        let requests = client.client().requests();
        assert_eq!(requests[0].url, "https://api.airtable.com/v0/appBASE/People");
        assert_eq!(
            requests[0].query,
            vec![("offset".to_string(), "itrPREV".to_string())]
        );
        assert!(requests[0]
            .headers
            .contains(&("Authorization".to_string(), "Bearer keySECRET".to_string())));
    }

    #[test]
    fn first_page_sends_no_offset() {
        let (client, _) = client_with(vec![HttpResponse::ok(r#"{"records":[]}"#)]);
        let page = client.fetch_page("tasks", None).unwrap();
        assert!(page.is_last());
        assert!(client.client().requests()[0].query.is_empty());
    }

    #[test]
    fn empty_offset_means_last_page() {
        let (client, _) = client_with(vec![HttpResponse::ok(r#"{"records":[],"offset":""}"#)]);
        assert!(client.fetch_page("tasks", None).unwrap().is_last());
    }

    #[test]
    fn rate_limit_retried_until_success() {
        let (client, sleeper) = client_with(vec![
            HttpResponse::new(429, ""),
            HttpResponse::new(429, ""),
            HttpResponse::ok(r#"{"records":[{"id":"rec1","fields":{}}]}"#),
        ]);

        let page = client.fetch_page("people", None).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(client.client().requests().len(), 3);

        let delays = sleeper.delays();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn rate_limit_exhaustion_reraises() {
        let (client, sleeper) = client_with(vec![
            HttpResponse::new(429, ""),
            HttpResponse::new(429, ""),
            HttpResponse::new(429, ""),
        ]);

        let result = client.fetch_page("people", None);
        assert!(matches!(result, Err(SyncError::RateLimited { .. })));
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[test]
    fn client_error_not_retried() {
        let (client, sleeper) = client_with(vec![HttpResponse::new(
            404,
            r#"{"error":"TABLE_NOT_FOUND"}"#,
        )]);

        match client.fetch_page("nope", None) {
            Err(SyncError::Upstream { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("TABLE_NOT_FOUND"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(client.client().requests().len(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn server_error_and_network_failure_retried() {
        let scripted = ScriptedClient::new();
        scripted.push_failure("connection reset by peer");
        scripted.push_response(HttpResponse::new(502, "bad gateway"));
        scripted.push_response(HttpResponse::ok(r#"{"records":[]}"#));
        let client = FetchClient::new(FetchConfig::new("app", "key"), scripted)
            .with_sleeper(Arc::new(RecordingSleeper::new()));

        assert!(client.fetch_page("people", None).is_ok());
        assert_eq!(client.client().requests().len(), 3);
    }

    #[test]
    fn malformed_body_is_permanent() {
        let (client, _) = client_with(vec![HttpResponse::ok("<html>oops</html>")]);
        assert!(matches!(
            client.fetch_page("people", None),
            Err(SyncError::Protocol(_))
        ));
        assert_eq!(client.client().requests().len(), 1);
    }

    #[test]
    fn empty_table_rejected_without_request() {
        let (client, _) = client_with(vec![]);
        assert!(matches!(
            client.fetch_page("  ", None),
            Err(SyncError::InvalidTable(_))
        ));
        assert!(client.client().requests().is_empty());
    }

    #[test]
    fn no_retry_config_makes_single_attempt() {
        let scripted = ScriptedClient::new();
        scripted.push_response(HttpResponse::new(429, ""));
        let config = FetchConfig::new("app", "key").with_retry(RetryConfig::no_retry());
        let client = FetchClient::new(config, scripted);

        assert!(client.fetch_page("people", None).is_err());
        assert_eq!(client.client().requests().len(), 1);
    }

    #[test]
    fn path_segment_encoding() {
        assert_eq!(encode_path_segment("People"), "People");
        assert_eq!(encode_path_segment("My Tasks"), "My%20Tasks");
        assert_eq!(encode_path_segment("a/b?c"), "a%2Fb%3Fc");
        assert_eq!(encode_path_segment("tbl_1.x~"), "tbl_1.x~");
    }

    #[test]
    fn long_error_bodies_truncated() {
        let body = "x".repeat(500);
        let short = excerpt(&body);
        assert_eq!(short.len(), ERROR_EXCERPT_LEN + 3);
        assert_eq!(excerpt("short"), "short");
    }
}
