//! Webhook signature test vectors.
//!
//! Digests were computed independently of this workspace.

/// One signed webhook delivery.
#[derive(Debug, Clone)]
pub struct SignatureVector {
    /// Unique identifier for this vector.
    pub id: &'static str,
    /// Shared secret.
    pub secret: &'static str,
    /// Timestamp header.
    pub timestamp: &'static str,
    /// Raw request body.
    pub body: &'static str,
    /// Expected lowercase hex HMAC-SHA256 of `timestamp || body`.
    pub expected_hex: &'static str,
}

/// Known-good signature vectors.
pub fn signature_vectors() -> Vec<SignatureVector> {
    vec![
        SignatureVector {
            id: "minimal_body",
            secret: "s3cr3t",
            timestamp: "1700000000",
            body: r#"{"x":1}"#,
            expected_hex: "124e4280b2ca7f09ea13a2a46ee88d59f21569aa5282c9b9289829e86fc9a13f",
        },
        SignatureVector {
            id: "empty_notification",
            secret: "webhook-secret",
            timestamp: "1712345678",
            body: r#"{"base":{"id":"appBASE"},"changedTablesById":{}}"#,
            expected_hex: "a0e4b7c0405f43da0081dce0b7d549980a02bdcb650d14cacf00c78469025a63",
        },
    ]
}

/// SHA-256 prefix of `{"x":1}` used in event id derivation.
pub const MINIMAL_BODY_DIGEST_PREFIX: &str = "5041bf1f713df204";
