//! Webhook payload signing and verification.
//!
//! Both providers sign webhook deliveries with HMAC-SHA256 over the raw
//! payload bytes, hex-encoded in a header. Verification decodes the
//! header and compares digests in constant time — a byte-by-byte early
//! exit would leak the matching prefix length through timing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex-encoded HMAC-SHA256 signature for a payload.
///
/// Used for webhook registration echoes and by tests to produce valid
/// deliveries.
#[must_use]
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded HMAC-SHA256 signature in constant time.
///
/// Returns `false` for malformed hex, wrong-length digests, or any
/// mismatch. Never panics on attacker-controlled input.
#[must_use]
pub fn verify_signature(secret: &str, payload: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    if provided.len() != expected.len() {
        return false;
    }
    expected.ct_eq(provided.as_slice()).into()
}
