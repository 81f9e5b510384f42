//! Webhook signature verification.
//!
//! A delivery is signed with HMAC-SHA256 keyed by the shared secret over the
//! timestamp header followed by the raw body, hex-encoded into the signature
//! header.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "X-Airtable-Webhook-Signature";

/// Header carrying the delivery timestamp.
pub const TIMESTAMP_HEADER: &str = "X-Airtable-Webhook-Timestamp";

/// Computes the lowercase hex signature for a delivery.
pub fn compute_signature(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this never falls through.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(timestamp.as_bytes());
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Returns true if `signature` is the signature of `timestamp || body`.
///
/// The comparison is constant-time over the hex text, so a digest differing
/// in any single character (including case) is rejected.
pub fn verify_signature(body: &[u8], signature: &str, timestamp: &str, secret: &[u8]) -> bool {
    let expected = compute_signature(secret, timestamp, body);
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Gatekeeper for inbound deliveries.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<Vec<u8>>,
    max_skew: Option<Duration>,
}

impl WebhookVerifier {
    /// Creates a verifier. `None` accepts every delivery.
    pub fn new(secret: Option<Vec<u8>>) -> Self {
        Self {
            secret,
            max_skew: None,
        }
    }

    /// Creates a verifier from server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        let verifier = Self::new(config.webhook_secret.clone());
        match config.max_timestamp_skew {
            Some(skew) => verifier.with_max_skew(skew),
            None => verifier,
        }
    }

    /// Rejects timestamps further than `skew` from the current time.
    pub fn with_max_skew(mut self, skew: Duration) -> Self {
        self.max_skew = Some(skew);
        self
    }

    /// Returns true if deliveries must be signed.
    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Checks a delivery against the current time.
    pub fn check(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> ServerResult<()> {
        self.check_at(body, signature, timestamp, Utc::now())
    }

    /// Checks a delivery against `now`.
    pub fn check_at(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServerResult<()> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };

        let (Some(signature), Some(timestamp)) = (present(signature), present(timestamp)) else {
            return Err(ServerError::MissingSignature);
        };

        if let Some(max_skew) = self.max_skew {
            check_freshness(timestamp, now, max_skew)?;
        }

        if verify_signature(body, signature, timestamp, secret) {
            Ok(())
        } else {
            Err(ServerError::InvalidSignature)
        }
    }
}

/// Treats an empty header value as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn check_freshness(timestamp: &str, now: DateTime<Utc>, max_skew: Duration) -> ServerResult<()> {
    let sent: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| ServerError::StaleTimestamp(format!("{timestamp:?} is not a unix time")))?;
    let skew = now.timestamp().abs_diff(sent);
    if skew > max_skew.as_secs() {
        return Err(ServerError::StaleTimestamp(format!(
            "{skew}s from server time exceeds {}s",
            max_skew.as_secs()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &[u8] = b"s3cr3t";
    const TIMESTAMP: &str = "1700000000";
    const BODY: &[u8] = br#"{"x":1}"#;
    const DIGEST: &str = "124e4280b2ca7f09ea13a2a46ee88d59f21569aa5282c9b9289829e86fc9a13f";

    #[test]
    fn accepts_known_digest() {
        assert_eq!(compute_signature(SECRET, TIMESTAMP, BODY), DIGEST);
        assert!(verify_signature(BODY, DIGEST, TIMESTAMP, SECRET));
    }

    #[test]
    fn rejects_every_single_char_mutation() {
        let alphabet: Vec<char> = "0123456789abcdefABCDEF".chars().collect();
        for (i, original) in DIGEST.char_indices() {
            for &replacement in &alphabet {
                if replacement == original {
                    continue;
                }
                let mut mutated = DIGEST.to_string();
                mutated.replace_range(i..i + 1, &replacement.to_string());
                assert!(
                    !verify_signature(BODY, &mutated, TIMESTAMP, SECRET),
                    "accepted mutation at {i}: {mutated}"
                );
            }
        }
    }

    #[test]
    fn rejects_truncated_and_extended() {
        assert!(!verify_signature(BODY, &DIGEST[..63], TIMESTAMP, SECRET));
        assert!(!verify_signature(BODY, &format!("{DIGEST}0"), TIMESTAMP, SECRET));
        assert!(!verify_signature(BODY, "", TIMESTAMP, SECRET));
    }

    #[test]
    fn rejects_other_timestamp_body_or_secret() {
        assert!(!verify_signature(BODY, DIGEST, "1700000001", SECRET));
        assert!(!verify_signature(br#"{"x":2}"#, DIGEST, TIMESTAMP, SECRET));
        assert!(!verify_signature(BODY, DIGEST, TIMESTAMP, b"other"));
    }

    #[test]
    fn unauthenticated_mode_accepts_anything() {
        let verifier = WebhookVerifier::new(None);
        assert!(!verifier.is_enabled());
        assert!(verifier.check(BODY, None, None).is_ok());
        assert!(verifier.check(BODY, Some("garbage"), None).is_ok());
    }

    #[test]
    fn missing_headers_rejected_before_verification() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_vec()));
        for (signature, timestamp) in [
            (None, Some(TIMESTAMP)),
            (Some(DIGEST), None),
            (Some(""), Some(TIMESTAMP)),
            (Some(DIGEST), Some("")),
            (None, None),
        ] {
            assert!(matches!(
                verifier.check(BODY, signature, timestamp),
                Err(ServerError::MissingSignature)
            ));
        }
    }

    #[test]
    fn signed_delivery_checks() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_vec()));
        assert!(verifier.check(BODY, Some(DIGEST), Some(TIMESTAMP)).is_ok());
        assert!(matches!(
            verifier.check(BODY, Some(&DIGEST.to_uppercase()), Some(TIMESTAMP)),
            Err(ServerError::InvalidSignature)
        ));
    }

    #[test]
    fn freshness_window() {
        let verifier =
            WebhookVerifier::new(Some(SECRET.to_vec())).with_max_skew(Duration::from_secs(300));
        let sent = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let within = sent + chrono::Duration::seconds(299);
        assert!(verifier
            .check_at(BODY, Some(DIGEST), Some(TIMESTAMP), within)
            .is_ok());

        let late = sent + chrono::Duration::seconds(301);
        assert!(matches!(
            verifier.check_at(BODY, Some(DIGEST), Some(TIMESTAMP), late),
            Err(ServerError::StaleTimestamp(_))
        ));

        assert!(matches!(
            verifier.check_at(BODY, Some(DIGEST), Some("yesterday"), within),
            Err(ServerError::StaleTimestamp(_))
        ));
    }

    #[test]
    fn without_skew_old_timestamps_pass() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_vec()));
        let far_future = Utc.timestamp_opt(2_000_000_000, 0).unwrap();
        assert!(verifier
            .check_at(BODY, Some(DIGEST), Some(TIMESTAMP), far_future)
            .is_ok());
    }
}
