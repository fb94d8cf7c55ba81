//! Tokens and one-way hashes.
//!
//! Bearer tokens (share links, invites) are random URL-safe strings; only a
//! peppered SHA-256 of them is ever persisted, so a database dump yields no
//! usable capabilities. OTPs are stored as keyed HMACs and compared in
//! constant time. Vendor email addresses are stored only as salted hashes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub type HmacSha256 = Hmac<Sha256>;

/// Raw entropy (bytes) behind a bearer token.
pub const TOKEN_BYTES: usize = 32;
/// Rendered length of a bearer token: 32 bytes as unpadded base64url.
pub const TOKEN_CHARS: usize = 43;

/// Generate a bearer token: 32 random bytes, unpadded URL-safe base64.
pub fn generate_token() -> String {
    let token = URL_SAFE_NO_PAD.encode(crate::crypto::random_bytes::<TOKEN_BYTES>());
    debug_assert_eq!(token.len(), TOKEN_CHARS);
    token
}

/// Storage form of a bearer token: hex `SHA-256(pepper || token)`.
pub fn token_hash(pepper: &SecretString, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pepper.expose_secret().as_bytes());
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a 6-digit OTP, uniform over 000000..=999999.
pub fn generate_otp() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Storage form of an OTP: hex `HMAC-SHA256(secret, otp || salt)`.
pub fn otp_hash(secret: &SecretString, otp: &str, salt: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("hmac accepts any key length");
    mac.update(otp.as_bytes());
    mac.update(salt);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time OTP check against the stored hex hash.
pub fn verify_otp(secret: &SecretString, otp: &str, salt: &[u8], stored_hex: &str) -> bool {
    let Ok(stored) = hex::decode(stored_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("hmac accepts any key length");
    mac.update(otp.as_bytes());
    mac.update(salt);
    let computed = mac.finalize().into_bytes();
    bool::from(computed.as_slice().ct_eq(stored.as_slice()))
}

/// Canonical address form used by every email hash: lowercased, trimmed.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Privacy-preserving vendor identifier: hex
/// `SHA-256(salt || lower(trim(email)))` with a caller-supplied salt.
pub fn hash_email_with_salt(salt: &[u8], email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(normalize_email(email).as_bytes());
    hex::encode(hasher.finalize())
}

/// Address-book equality helper: same construction under the process-wide
/// `VENDOR_EMAIL_HASH_SALT`.
pub fn hash_vendor_email(global_salt: &SecretString, email: &str) -> String {
    hash_email_with_salt(global_salt.expose_secret().as_bytes(), email)
}

/// Case-insensitive, trimmed email equality.
pub fn emails_match(a: &str, b: &str) -> bool {
    normalize_email(a) == normalize_email(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn token_is_url_safe_and_unpadded() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_CHARS);
        assert!(!token.contains('='));
        let decoded = URL_SAFE_NO_PAD.decode(token.as_bytes()).expect("valid base64url");
        assert_eq!(decoded.len(), TOKEN_BYTES);
    }

    #[test]
    fn token_hash_depends_on_pepper() {
        let token = generate_token();
        let a = token_hash(&secret("pepper-a"), &token);
        let b = token_hash(&secret("pepper-b"), &token);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..32 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn otp_verifies_against_stored_hash() {
        let key = secret("otp-secret");
        let salt = [7u8; 16];

        let stored = otp_hash(&key, "123456", &salt);
        assert!(verify_otp(&key, "123456", &salt, &stored));
        assert!(!verify_otp(&key, "123457", &salt, &stored));
        assert!(!verify_otp(&key, "123456", &[8u8; 16], &stored));
        assert!(!verify_otp(&secret("other"), "123456", &salt, &stored));
    }

    #[test]
    fn email_hash_normalizes_case_and_whitespace() {
        let salt = [1u8; 16];
        assert_eq!(
            hash_email_with_salt(&salt, "  V@Example.Test "),
            hash_email_with_salt(&salt, "v@example.test"),
        );
        assert_ne!(
            hash_email_with_salt(&salt, "v@example.test"),
            hash_email_with_salt(&[2u8; 16], "v@example.test"),
        );
    }

    #[test]
    fn emails_match_is_case_insensitive() {
        assert!(emails_match("V@Example.Test ", "v@example.test"));
        assert!(!emails_match("a@example.test", "b@example.test"));
    }
}
