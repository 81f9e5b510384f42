//! Change-event identity and provenance.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tablemirror_store::NewChangeEvent;

/// Timestamp component used when a delivery carries no timestamp.
pub const NO_TIMESTAMP: &str = "none";

/// Hex characters of the body digest kept in an event id.
const DIGEST_PREFIX_LEN: usize = 16;

/// Derives the event id `<timestamp>_<sha256(body) prefix>`.
///
/// Redelivery of the same body with the same timestamp yields the same id.
/// Without a timestamp a repeated body may be a new change, so the id is
/// `none_<sha256(body) prefix>_<random>` and never collides.
pub fn derive_event_id(timestamp: Option<&str>, body: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(body));
    let digest = &digest[..DIGEST_PREFIX_LEN];
    match timestamp.filter(|t| !t.is_empty()) {
        Some(timestamp) => format!("{timestamp}_{digest}"),
        None => format!("{NO_TIMESTAMP}_{digest}_{:016x}", rand::random::<u64>()),
    }
}

/// Upstream base identifier of a notification, or `"unknown"`.
pub fn source_identifier(payload: &Value) -> String {
    payload
        .get("base")
        .and_then(|base| base.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .unwrap_or(NewChangeEvent::UNKNOWN_SOURCE)
        .to_string()
}

/// Builds the audit event for one delivery.
pub fn new_change_event(timestamp: Option<&str>, body: &[u8], payload: Value) -> NewChangeEvent {
    NewChangeEvent::new(
        derive_event_id(timestamp, body),
        source_identifier(&payload),
        payload,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_id_format() {
        assert_eq!(
            derive_event_id(Some("1700000000"), br#"{"x":1}"#),
            "1700000000_5041bf1f713df204"
        );
    }

    #[test]
    fn untimestamped_event_ids_are_unique() {
        let first = derive_event_id(None, br#"{"x":1}"#);
        let second = derive_event_id(Some(""), br#"{"x":1}"#);

        assert!(first.starts_with("none_5041bf1f713df204_"));
        assert!(second.starts_with("none_5041bf1f713df204_"));
        assert_eq!(first.len(), "none_5041bf1f713df204_".len() + 16);
        assert_ne!(first, second);
    }

    #[test]
    fn event_id_tracks_body_and_timestamp() {
        let a = derive_event_id(Some("1"), b"{}");
        assert_eq!(a, derive_event_id(Some("1"), b"{}"));
        assert_ne!(a, derive_event_id(Some("2"), b"{}"));
        assert_ne!(a, derive_event_id(Some("1"), b"{ }"));
    }

    #[test]
    fn source_identifier_fallback() {
        assert_eq!(source_identifier(&json!({"base": {"id": "appBASE"}})), "appBASE");
        assert_eq!(source_identifier(&json!({"base": {}})), "unknown");
        assert_eq!(source_identifier(&json!({"base": "appBASE"})), "unknown");
        assert_eq!(source_identifier(&json!({"base": {"id": 7}})), "unknown");
        assert_eq!(source_identifier(&json!({})), "unknown");
    }

    #[test]
    fn change_event_carries_payload() {
        let payload = json!({"base": {"id": "appX"}});
        let event = new_change_event(Some("5"), b"{}", payload.clone());
        assert_eq!(event.source_identifier, "appX");
        assert_eq!(event.raw_payload, payload);
        assert!(event.event_id.starts_with("5_"));
    }
}
