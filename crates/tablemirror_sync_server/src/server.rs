//! Route dispatch for the mirror service.

use crate::auth::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{ListParams, RequestHandler};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use tablemirror_store::MirrorStore;
use tablemirror_sync_engine::{RecordSource, Synchronizer};
use tracing::{debug, error};

#[cfg(test)]
const WEBHOOK_PATH: &str = "/webhooks/airtable-webhook";

/// Request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// Any other method.
    Other(String),
}

impl Method {
    /// Parses a method name, case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Other(name) => write!(f, "{name}"),
        }
    }
}

/// A request handed over by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Method.
    pub method: Method,
    /// Path as received, still percent-encoded, without query string.
    pub path: String,
    /// Decoded query parameters in order.
    pub query: Vec<(String, String)>,
    /// Headers; names compare case-insensitively.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// Creates a request for a target such as `/api/v1/records?skip=10`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, Vec::new()),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Creates a request whose path is `segments`, each percent-encoded.
    pub fn from_segments<I, T>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let path: String = segments
            .into_iter()
            .map(|segment| format!("/{}", percent_encode(segment.as_ref())))
            .collect();
        Self::new(method, if path.is_empty() { "/" } else { &path })
    }

    /// Creates a `GET` request.
    pub fn get(target: &str) -> Self {
        Self::new(Method::Get, target)
    }

    /// Creates a `POST` request with a body.
    pub fn post(target: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::Post, target).with_body(body)
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Splits the path on `/` and decodes each segment. `+` stays literal
    /// and empty segments are dropped.
    pub fn segments(&self) -> Vec<String> {
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| percent_decode(segment, false))
            .collect()
    }

    /// Returns the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response for the listener to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl ApiResponse {
    /// Creates a `200 OK` response.
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// Creates the response for an error.
    pub fn from_error(error: &ServerError) -> Self {
        Self {
            status: error.status_code(),
            body: json!({ "detail": error.to_string() }),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Serializes the body.
    pub fn body_text(&self) -> String {
        self.body.to_string()
    }
}

/// The mirror service.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tablemirror_store::MemoryStore;
/// use tablemirror_sync_engine::{MockSource, SyncConfig, Synchronizer};
/// use tablemirror_sync_server::{ApiRequest, MirrorServer, ServerConfig};
///
/// let sync = Synchronizer::new(
///     SyncConfig::new(),
///     Arc::new(MockSource::new()),
///     Arc::new(MemoryStore::new()),
/// );
/// let server = MirrorServer::new(ServerConfig::default(), sync);
///
/// // In a real application an HTTP listener forwards every request here
/// let response = server.route(&ApiRequest::get("/health"));
/// assert_eq!(response.status, 200);
/// ```
pub struct MirrorServer<S: RecordSource, M: MirrorStore> {
    handler: RequestHandler<S, M>,
}

impl<S: RecordSource, M: MirrorStore> MirrorServer<S, M> {
    /// Creates a new mirror server.
    pub fn new(config: ServerConfig, synchronizer: Synchronizer<S, M>) -> Self {
        Self {
            handler: RequestHandler::new(config, synchronizer),
        }
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler<S, M> {
        &self.handler
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        self.handler.config()
    }

    /// Dispatches a request. Every failure becomes a `{"detail": ...}` body.
    pub fn route(&self, request: &ApiRequest) -> ApiResponse {
        debug!(method = %request.method, path = %request.path, "routing request");
        match self.dispatch(request) {
            Ok(body) => ApiResponse::ok(body),
            Err(e) => {
                if e.is_server_error() {
                    error!(method = %request.method, path = %request.path, error = %e, "request failed");
                } else {
                    debug!(status = e.status_code(), error = %e, "request rejected");
                }
                ApiResponse::from_error(&e)
            }
        }
    }

    fn dispatch(&self, request: &ApiRequest) -> ServerResult<Value> {
        let segments = request.segments();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let method = &request.method;

        match (method, segments.as_slice()) {
            (Method::Get, []) => Ok(self.handler.root()),
            (Method::Get, ["health"]) => Ok(self.handler.health()),
            (Method::Post, ["webhooks", "airtable-webhook"]) => {
                let response = self.handler.webhook(
                    &request.body,
                    request.header(SIGNATURE_HEADER),
                    request.header(TIMESTAMP_HEADER),
                )?;
                to_json(&response)
            }
            (_, [] | ["health"] | ["webhooks", "airtable-webhook"]) => Err(not_allowed(request)),
            (_, ["api", "v1", rest @ ..]) => self.dispatch_api(request, rest),
            _ => Err(not_found()),
        }
    }

    fn dispatch_api(&self, request: &ApiRequest, segments: &[&str]) -> ServerResult<Value> {
        let method = &request.method;
        let config = self.handler.config();

        match (method, segments) {
            (Method::Post, ["sync", table]) => to_json(&self.handler.sync_table(table)?),
            (Method::Get, ["records"]) => {
                let params = ListParams::from_query(config, &request.query)?;
                to_json(&self.handler.list_records(&params)?)
            }
            (Method::Get, ["records", record_id]) => to_json(&self.handler.get_record(record_id)?),
            (Method::Get, ["events"]) => {
                let limit = match query_value(request, "limit") {
                    Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                        ServerError::Validation("limit must be a non-negative integer".into())
                    })?,
                    None => config.default_list_limit,
                };
                to_json(&self.handler.list_events(limit)?)
            }
            (Method::Get, [table]) if config.convenience_tables.iter().any(|t| t == table) => {
                let paging: Vec<(String, String)> = request
                    .query
                    .iter()
                    .filter(|(key, _)| key == "skip" || key == "limit")
                    .cloned()
                    .collect();
                let params = ListParams::from_query(config, &paging)?.with_table(*table);
                to_json(&self.handler.list_records(&params)?)
            }
            (_, ["sync", _] | ["records"] | ["records", _] | ["events"]) => {
                Err(not_allowed(request))
            }
            (_, [table]) if config.convenience_tables.iter().any(|t| t == table) => {
                Err(not_allowed(request))
            }
            _ => {
                debug!(path = %request.path, "no API route");
                Err(not_found())
            }
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> ServerResult<Value> {
    serde_json::to_value(value).map_err(|e| ServerError::Store(e.into()))
}

fn not_found() -> ServerError {
    ServerError::NotFound("Not Found".to_string())
}

fn not_allowed(request: &ApiRequest) -> ServerError {
    ServerError::MethodNotAllowed {
        method: request.method.to_string(),
        path: request.path.clone(),
    }
}

fn query_value<'a>(request: &'a ApiRequest, key: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (percent_decode(key, true), percent_decode(value, true)),
            None => (percent_decode(pair, true), String::new()),
        })
        .collect()
}

/// Encodes everything but unreserved characters as `%XX`.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(char::from(byte));
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Decodes `%XX` escapes, and `+` as space when `plus_as_space` (query
/// strings). Malformed escapes are kept as is.
fn percent_decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' if plus_as_space => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
