//! Integrity filter (spec §4.4.9): verifies an HMAC-SHA256 signature over
//! the exact received body bytes concatenated with the request timestamp,
//! rejecting stale timestamps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SecurityError;

type HmacSha256 = Hmac<Sha256>;

/// Default allowed clock skew (T_skew, spec §4.4.9).
pub const DEFAULT_SKEW: Duration = Duration::from_secs(5 * 60);

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute the HMAC-SHA256 signature over `body_bytes || timestamp`,
/// hex-encoded, the way the integrity header is meant to be produced.
pub fn sign(secret: &str, body_bytes: &[u8], timestamp: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body_bytes);
    mac.update(timestamp.as_bytes());
    hex_encode(&mac.finalize().into_bytes())
}

/// Verify a signature against the exact bytes received on the wire. Using
/// the raw bytes (rather than a re-serialized body) avoids signature
/// mismatches caused by field-order or whitespace normalization.
pub fn verify(
    secret: &str,
    body_bytes: &[u8],
    timestamp: &str,
    signature: &str,
    skew: Duration,
) -> Result<(), SecurityError> {
    let request_time: u64 = timestamp
        .parse()
        .map_err(|_| SecurityError::IntegrityFailed("invalid timestamp".into()))?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs();

    let drift = now.abs_diff(request_time);
    if drift > skew.as_secs() {
        return Err(SecurityError::IntegrityFailed("stale timestamp".into()));
    }

    let expected = sign(secret, body_bytes, timestamp);
    if !constant_time_eq(&expected, signature) {
        return Err(SecurityError::IntegrityFailed("signature mismatch".into()));
    }

    Ok(())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now_str() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string()
    }

    #[test]
    fn valid_signature_over_exact_bytes_verifies() {
        let secret = "shared-secret";
        let body = br#"{"amount":100}"#;
        let ts = now_str();
        let sig = sign(secret, body, &ts);
        assert!(verify(secret, body, &ts, &sig, DEFAULT_SKEW).is_ok());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = "shared-secret";
        let body = br#"{"amount":100}"#;
        let ts = now_str();
        let sig = sign(secret, body, &ts);
        let tampered = br#"{"amount":900}"#;
        assert!(verify(secret, tampered, &ts, &sig, DEFAULT_SKEW).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let secret = "shared-secret";
        let body = b"payload";
        let stale_ts = "1000000000";
        let sig = sign(secret, body, stale_ts);
        let err = verify(secret, body, stale_ts, &sig, DEFAULT_SKEW).unwrap_err();
        assert!(matches!(err, SecurityError::IntegrityFailed(_)));
    }
}
