//! Vendor-side crypto: Vendor Secret entry, LSK recovery, document opening.
//!
//! The Vendor Secret checksum is verified before any key derivation — a typo
//! is caught locally, with no HTTP round-trip and no server state change.

use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{self, CryptoError, SecretBytes};
use crate::vendor_secret::{VendorSecret, VendorSecretError};

#[derive(Debug, Error)]
pub enum VendorClientError {
    #[error(transparent)]
    Secret(#[from] VendorSecretError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Normalize the transcribed secret, derive K_wrap, and unwrap the LSK.
pub fn recover_lsk(
    vs_input: &str,
    lsk_salt: &[u8],
    encrypted_lsk_for_vendor: &[u8],
) -> Result<SecretBytes, VendorClientError> {
    let vs = VendorSecret::normalize(vs_input)?;
    let k_wrap = crypto::hkdf_vendor_wrap(vs.to_ikm_bytes().as_ref(), lsk_salt)?;
    Ok(crypto::unwrap_key(&k_wrap, encrypted_lsk_for_vendor)?)
}

/// Unwrap a link DEK under the LSK and open the fetched blob.
pub fn decrypt_document(
    lsk: &SecretBytes,
    encrypted_dek_for_link: &[u8],
    blob: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let dek = crypto::unwrap_key(lsk, encrypted_dek_for_link)?;
    crypto::open(&dek, blob)
}

/// Watermark reference for the upcoming reveal, generated before decryption
/// and rendered into every visible copy.
pub fn new_watermark_reference() -> Uuid {
    Uuid::new_v4()
}

/// Extensions that receive a visible watermark. Anything else downloads
/// unwatermarked, though the reveal is audited all the same.
pub fn is_watermarkable(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    [".jpg", ".jpeg", ".png", ".webp", ".gif"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}
