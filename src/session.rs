//! Vendor session cookies.
//!
//! A session is a signed claim set, not a server-side row: JSON payload,
//! a `:` separator, and a hex HMAC-SHA256 over the payload. The payload JSON
//! itself contains `:`, so parsers split at the *last* occurrence — the
//! signature is hex and never contains one. Sessions are bound to a
//! user-agent fingerprint to deter cookie theft without defeating legitimate
//! use.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

pub const COOKIE_NAME: &str = "vendor_session";

/// Hex chars of the truncated user-agent fingerprint carried in the claims.
const USER_AGENT_HASH_CHARS: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed session cookie")]
    Malformed,

    #[error("bad session signature")]
    BadSignature,

    #[error("session expired")]
    Expired,

    #[error("session user-agent mismatch")]
    UserAgentMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSessionClaims {
    pub share_link_id: Uuid,
    pub vendor_email_hash: String,
    pub user_agent_hash: String,
    pub expires_at: u64,
}

fn hmac_hex(secret: &SecretString, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Truncated user-agent fingerprint: first 16 hex chars of
/// `HMAC-SHA256(secret, user_agent)`.
pub fn user_agent_hash(secret: &SecretString, user_agent: &str) -> String {
    let mut h = hmac_hex(secret, user_agent.as_bytes());
    h.truncate(USER_AGENT_HASH_CHARS);
    h
}

/// Serialize and sign a claim set into a cookie value.
pub fn mint(secret: &SecretString, claims: &VendorSessionClaims) -> String {
    let payload = serde_json::to_string(claims).expect("claims serialize");
    let sig = hmac_hex(secret, payload.as_bytes());
    format!("{payload}:{sig}")
}

/// Validate a cookie value: signature, expiry, user-agent binding.
pub fn validate(
    secret: &SecretString,
    cookie: &str,
    user_agent: &str,
    now: u64,
) -> Result<VendorSessionClaims, SessionError> {
    let (payload, sig) = cookie.rsplit_once(':').ok_or(SessionError::Malformed)?;

    let expected = hmac_hex(secret, payload.as_bytes());
    if !bool::from(expected.as_bytes().ct_eq(sig.as_bytes())) {
        return Err(SessionError::BadSignature);
    }

    let claims: VendorSessionClaims =
        serde_json::from_str(payload).map_err(|_| SessionError::Malformed)?;

    if claims.expires_at <= now {
        return Err(SessionError::Expired);
    }
    if claims.user_agent_hash != user_agent_hash(secret, user_agent) {
        return Err(SessionError::UserAgentMismatch);
    }
    Ok(claims)
}

/// Cookie attribute string for Set-Cookie headers.
pub fn cookie_attributes(secure: bool, ttl_secs: u64) -> String {
    let mut attrs = format!("HttpOnly; SameSite=Lax; Path=/; Max-Age={ttl_secs}");
    if secure {
        attrs.push_str("; Secure");
    }
    attrs
}
