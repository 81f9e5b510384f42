//! HTTP client abstraction.
//!
//! The fetch client talks to upstream through [`HttpClient`] so the network
//! library stays swappable and tests can script responses.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: String,
    /// `Retry-After` header, if present.
    pub retry_after: Option<String>,
}

impl HttpResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// Creates a `200 OK` response.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }
}

/// HTTP client abstraction.
///
/// Non-success statuses are returned as responses, not errors. `Err` is
/// reserved for failures where no response arrived (DNS, connect, timeout).
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, String>;
}

/// Production client backed by `ureq`.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    /// Creates a client with a global per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl HttpClient for UreqClient {
    fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, String> {
        let mut request = self.agent.get(url);
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.call().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| format!("failed reading response body: {e}"))?;

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A request captured by [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request URL without query string.
    pub url: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
}

/// An HTTP client that replays scripted responses in order.
///
/// Useful for testing the fetch client without a network.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedClient {
    /// Creates a client with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a transport failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.responses.lock().push_back(Err(message.into()));
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl HttpClient for ScriptedClient {
    fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, String> {
        self.requests.lock().push(RecordedRequest {
            url: url.to_string(),
            query: owned_pairs(query),
            headers: owned_pairs(headers),
        });

        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_client_replays_in_order() {
        let client = ScriptedClient::new();
        client.push_response(HttpResponse::new(429, ""));
        client.push_failure("connection reset");
        client.push_response(HttpResponse::ok("{}"));

        assert_eq!(client.get("u", &[], &[]).unwrap().status, 429);
        assert_eq!(client.get("u", &[], &[]).unwrap_err(), "connection reset");
        assert_eq!(client.get("u", &[], &[]).unwrap().body, "{}");
        assert!(client.get("u", &[], &[]).is_err());
    }

    #[test]
    fn scripted_client_records_requests() {
        let client = ScriptedClient::new();
        client.push_response(HttpResponse::ok("{}"));
        client
            .get("https://x/t", &[("offset", "p2")], &[("Authorization", "Bearer k")])
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://x/t");
        assert_eq!(requests[0].query, vec![("offset".to_string(), "p2".to_string())]);
        assert_eq!(requests[0].headers[0].1, "Bearer k");
    }
}
