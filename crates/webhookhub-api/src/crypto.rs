//! Signature verification, idempotency-key derivation, and secret
//! generation.
//!
//! The HMAC key is the 64-char lowercase hex secret string itself, as
//! ASCII bytes. The hex is never decoded; both sides of the wire share
//! this convention and decoding would break compatibility.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Length of a signing secret and of a hex-encoded signature.
pub const SECRET_HEX_LEN: usize = 64;

/// Verifies an inbound webhook signature.
///
/// Computes HMAC-SHA256 over the raw body keyed by the secret string's
/// bytes, hex-encodes lowercase, and compares against the provided
/// signature in constant time. Any length or byte mismatch rejects;
/// nothing about the expected digest leaks to the caller.
pub fn verify_signature(secret_hex: &str, raw_body: &[u8], provided_signature_hex: &str) -> bool {
    let Ok(expected) = sign(secret_hex, raw_body) else {
        return false;
    };

    constant_time_eq(expected.as_bytes(), provided_signature_hex.as_bytes())
}

/// Computes the lowercase hex HMAC-SHA256 signature for a payload.
///
/// # Errors
///
/// Returns an error only if the MAC cannot be initialized.
pub fn sign(secret_hex: &str, payload: &[u8]) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret_hex.as_bytes())?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time byte comparison.
///
/// Runs in time dependent only on the input length. A length mismatch
/// returns early, which is fine: signature lengths are public.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }

    diff == 0
}

/// Derives the event idempotency key from request metadata.
///
/// `hex(sha256(source_name || 0x00 || event_type || 0x00 || raw_body))`.
/// The NUL separators keep `("ab", "c")` and `("a", "bc")` distinct.
pub fn derive_idempotency_key(source_name: &str, event_type: &str, raw_body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(event_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(raw_body);
    hex::encode(hasher.finalize())
}

/// Generates a fresh signing secret: 64 lowercase hex chars from a
/// cryptographic RNG.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "f5a1c9d200112233445566778899aabbccddeeff00112233445566778899aabb";

    #[test]
    fn valid_signature_accepted() {
        let body = br#"{"ref":"main"}"#;
        let signature = sign(SECRET, body).expect("sign");

        assert!(verify_signature(SECRET, body, &signature));
    }

    #[test]
    fn tampered_body_rejected() {
        let signature = sign(SECRET, b"original body").expect("sign");

        assert!(!verify_signature(SECRET, b"tampered body", &signature));
    }

    #[test]
    fn wrong_length_signature_rejected() {
        assert!(!verify_signature(SECRET, b"body", "deadbeef"));
        assert!(!verify_signature(SECRET, b"body", ""));
    }

    #[test]
    fn uppercase_signature_rejected() {
        // The contract is lowercase hex; case normalization would weaken
        // the byte-for-byte comparison.
        let signature = sign(SECRET, b"body").expect("sign").to_uppercase();

        assert!(!verify_signature(SECRET, b"body", &signature));
    }

    #[test]
    fn secret_string_is_the_key_not_its_bytes() {
        // Keying with the decoded hex bytes must produce a different
        // signature; the string-as-key convention is load-bearing.
        let body = b"payload";
        let string_keyed = sign(SECRET, body).expect("sign");

        let decoded = hex::decode(SECRET).expect("valid hex");
        let mut mac = HmacSha256::new_from_slice(&decoded).expect("mac");
        mac.update(body);
        let bytes_keyed = hex::encode(mac.finalize().into_bytes());

        assert_ne!(string_keyed, bytes_keyed);
    }

    #[test]
    fn idempotency_key_is_deterministic() {
        let a = derive_idempotency_key("github", "push", br#"{"ref":"main"}"#);
        let b = derive_idempotency_key("github", "push", br#"{"ref":"main"}"#);

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn idempotency_key_varies_with_each_component() {
        let base = derive_idempotency_key("github", "push", b"{}");

        assert_ne!(base, derive_idempotency_key("gitlab", "push", b"{}"));
        assert_ne!(base, derive_idempotency_key("github", "tag", b"{}"));
        assert_ne!(base, derive_idempotency_key("github", "push", b"{} "));
    }

    #[test]
    fn idempotency_key_separators_prevent_ambiguity() {
        assert_ne!(
            derive_idempotency_key("ab", "c", b""),
            derive_idempotency_key("a", "bc", b""),
        );
    }

    #[test]
    fn generated_secret_is_64_lowercase_hex_chars() {
        let secret = generate_secret();

        assert_eq!(secret.len(), SECRET_HEX_LEN);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(secret, generate_secret());
    }
}
