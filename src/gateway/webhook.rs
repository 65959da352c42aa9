//! Webhook signature verification.
//!
//! The gateway signs every webhook delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"` and sends the result in a `Stripe-Signature`
//! header of the form:
//!
//! ```text
//! t=1492774577,v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
//! ```
//!
//! Verification fails closed: a missing or malformed header, a stale
//! timestamp, or a signature mismatch all reject the payload before any of
//! it is parsed as an event. Comparison is constant-time via `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed payload, in seconds. Replays older than this are
/// rejected even with a valid signature.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// A verified webhook event.
///
/// `object` is left as raw JSON; handlers parse it into the concrete shape
/// they expect for the event type they handle.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,

    /// Event type, e.g. `payment_intent.succeeded`
    #[serde(rename = "type")]
    pub event_type: String,

    pub data: EventData,
}

/// Payload container inside a webhook event.
#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Verify a webhook delivery and parse it into an event.
///
/// # Arguments
///
/// * `secret` - Shared signing secret from gateway configuration
/// * `payload` - Raw request body, exactly as received
/// * `signature_header` - Value of the `Stripe-Signature` header
/// * `now_unix` - Current unix time, injected for testability
/// * `tolerance_secs` - Maximum accepted payload age
///
/// # Errors
///
/// Returns `Validation` on any failure. Callers must treat that as a hard
/// rejection (HTTP 400) and never process the payload.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<WebhookEvent, AppError> {
    let (timestamp, candidates) = parse_signature_header(signature_header)?;

    // Reject replays outside the tolerance window
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(AppError::Validation(
            "Webhook signature timestamp outside tolerance".to_string(),
        ));
    }

    // Signed content is "{timestamp}.{raw_body}"
    let verified = candidates.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if !verified {
        return Err(AppError::Validation(
            "Webhook signature mismatch".to_string(),
        ));
    }

    serde_json::from_slice(payload)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {e}")))
}

/// Split the header into the timestamp and the v1 signature candidates.
///
/// Multiple `v1` entries are legal (the gateway sends one per active
/// signing secret during rotation); any one matching is sufficient.
fn parse_signature_header(header: &str) -> Result<(i64, Vec<String>), AppError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for element in header.split(',') {
        match element.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value.to_string()),
            // Ignore unknown schemes (e.g. v0)
            _ => {}
        }
    }

    match (timestamp, candidates.is_empty()) {
        (Some(t), false) => Ok((t, candidates)),
        _ => Err(AppError::Validation(
            "Malformed webhook signature header".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;

    fn sign(secret: &str, payload: &[u8], timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!(
            "t={timestamp},v1={}",
            hex::encode(mac.finalize().into_bytes())
        )
    }

    #[test]
    fn accepts_a_valid_signature() {
        let header = sign(SECRET, PAYLOAD, 1_700_000_000);
        let event = verify_signature(
            SECRET,
            PAYLOAD,
            &header,
            1_700_000_010,
            DEFAULT_TOLERANCE_SECS,
        )
        .unwrap();

        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.id, "evt_1");
    }

    #[test]
    fn rejects_a_wrong_secret() {
        let header = sign("whsec_other", PAYLOAD, 1_700_000_000);
        let err = verify_signature(
            SECRET,
            PAYLOAD,
            &header,
            1_700_000_010,
            DEFAULT_TOLERANCE_SECS,
        )
        .unwrap_err();

        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let header = sign(SECRET, PAYLOAD, 1_700_000_000);
        let tampered = PAYLOAD.to_vec().repeat(2);
        assert!(
            verify_signature(
                SECRET,
                &tampered,
                &header,
                1_700_000_010,
                DEFAULT_TOLERANCE_SECS
            )
            .is_err()
        );
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let header = sign(SECRET, PAYLOAD, 1_700_000_000);
        let err = verify_signature(
            SECRET,
            PAYLOAD,
            &header,
            1_700_000_000 + DEFAULT_TOLERANCE_SECS + 1,
            DEFAULT_TOLERANCE_SECS,
        )
        .unwrap_err();

        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn rejects_malformed_headers() {
        for header in ["", "t=abc", "v1=deadbeef", "t=,v1=", "nonsense"] {
            assert!(
                verify_signature(SECRET, PAYLOAD, header, 1_700_000_000, DEFAULT_TOLERANCE_SECS)
                    .is_err(),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_when_any_rotation_candidate_matches() {
        let valid = sign(SECRET, PAYLOAD, 1_700_000_000);
        let valid_sig = valid.split_once("v1=").unwrap().1.to_string();
        let header = format!("t=1700000000,v1={},v1={valid_sig}", "ab".repeat(32));

        assert!(
            verify_signature(
                SECRET,
                PAYLOAD,
                &header,
                1_700_000_010,
                DEFAULT_TOLERANCE_SECS
            )
            .is_ok()
        );
    }
}
