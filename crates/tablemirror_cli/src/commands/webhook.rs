//! Webhook command implementation.

use std::io::Read;
use std::path::Path;
use tablemirror_sync_server::{ApiRequest, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Reads the raw body from `path`, or from stdin when `path` is `-`.
pub fn read_body(path: &Path) -> std::io::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        std::io::stdin().read_to_end(&mut body)?;
        Ok(body)
    } else {
        std::fs::read(path)
    }
}

/// Builds a delivery request with the given headers.
pub fn request(body: Vec<u8>, signature: Option<&str>, timestamp: Option<&str>) -> ApiRequest {
    let mut request = ApiRequest::post("/webhooks/airtable-webhook", body);
    if let Some(signature) = signature {
        request = request.with_header(SIGNATURE_HEADER, signature);
    }
    if let Some(timestamp) = timestamp {
        request = request.with_header(TIMESTAMP_HEADER, timestamp);
    }
    request
}
