//! Fixed binary layouts for ciphertext blobs and key wraps.
//!
//! Document blob (stored at the vault's storage path):
//! `ciphertext || nonce(12B) || tag(16B)`.
//!
//! Wrap blob (for 32-byte key material, always 60 bytes):
//! `wrappedKey(32B) || nonce(12B) || tag(16B)`.
//!
//! The nonce lives inside the blob and is authoritative on decryption. Rows
//! also carry a sibling nonce field (`dek_nonce`, `lsk_nonce`,
//! `dek_for_link_nonce`) which is diagnostic only and verified nowhere.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{CryptoError, KEY_LEN, SecretBytes, random_bytes};

/// Size (bytes) of AES-GCM nonces.
pub const NONCE_LEN: usize = 12;
/// Size (bytes) of AES-GCM authentication tags.
pub const TAG_LEN: usize = 16;
/// Bytes a document blob adds on top of its ciphertext.
pub const DOC_BLOB_OVERHEAD: usize = NONCE_LEN + TAG_LEN;
/// Exact size of a wrap blob for 32-byte key material.
pub const WRAP_BLOB_LEN: usize = KEY_LEN + NONCE_LEN + TAG_LEN;

fn cipher(key: &SecretBytes) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key.expose_secret()).map_err(|_| CryptoError::InvalidKeyLength)
}

/// Encrypt `plaintext` under `key` into a document blob with a fresh nonce.
pub fn seal(key: &SecretBytes, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = random_bytes::<NONCE_LEN>();
    let ct_and_tag = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::AuthTag)?;

    // AEAD output is ciphertext || tag; splice the nonce in between.
    let split = ct_and_tag.len() - TAG_LEN;
    let mut blob = Vec::with_capacity(ct_and_tag.len() + NONCE_LEN);
    blob.extend_from_slice(&ct_and_tag[..split]);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ct_and_tag[split..]);
    Ok(blob)
}

/// Decrypt a document blob. Fails with `AuthTag` on tampering or a wrong key.
///
/// Plaintext is returned in `Zeroizing<Vec<u8>>` to reduce accidental retention.
pub fn open(key: &SecretBytes, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if blob.len() < DOC_BLOB_OVERHEAD {
        return Err(CryptoError::MalformedBlob);
    }

    let (ct, trailer) = blob.split_at(blob.len() - DOC_BLOB_OVERHEAD);
    let (nonce, tag) = trailer.split_at(NONCE_LEN);

    let mut ct_and_tag = Vec::with_capacity(ct.len() + TAG_LEN);
    ct_and_tag.extend_from_slice(ct);
    ct_and_tag.extend_from_slice(tag);

    let plaintext = cipher(key)?
        .decrypt(Nonce::from_slice(nonce), ct_and_tag.as_slice())
        .map_err(|_| CryptoError::AuthTag)?;
    Ok(Zeroizing::new(plaintext))
}

/// Wrap 32-byte key material under `outer_key`. The result is always
/// `WRAP_BLOB_LEN` (60) bytes.
pub fn wrap_key(outer_key: &SecretBytes, inner_key: &SecretBytes) -> Result<Vec<u8>, CryptoError> {
    if inner_key.expose_secret().len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength);
    }
    seal(outer_key, inner_key.expose_secret())
}

/// Unwrap a 60-byte wrap blob back into key material.
pub fn unwrap_key(outer_key: &SecretBytes, blob: &[u8]) -> Result<SecretBytes, CryptoError> {
    if blob.len() != WRAP_BLOB_LEN {
        return Err(CryptoError::MalformedBlob);
    }
    let inner = open(outer_key, blob)?;
    Ok(SecretBytes::from(inner.to_vec()))
}

/// The nonce embedded in a wrap blob, for populating the sibling row field.
pub fn wrap_blob_nonce(blob: &[u8]) -> Result<[u8; NONCE_LEN], CryptoError> {
    if blob.len() != WRAP_BLOB_LEN {
        return Err(CryptoError::MalformedBlob);
    }
    let nonce: [u8; NONCE_LEN] = blob[KEY_LEN..KEY_LEN + NONCE_LEN]
        .try_into()
        .expect("slice is NONCE_LEN bytes");
    Ok(nonce)
}

/// The nonce embedded in a document blob.
pub fn doc_blob_nonce(blob: &[u8]) -> Result<[u8; NONCE_LEN], CryptoError> {
    if blob.len() < DOC_BLOB_OVERHEAD {
        return Err(CryptoError::MalformedBlob);
    }
    let start = blob.len() - DOC_BLOB_OVERHEAD;
    let nonce: [u8; NONCE_LEN] = blob[start..start + NONCE_LEN]
        .try_into()
        .expect("slice is NONCE_LEN bytes");
    Ok(nonce)
}

/// Hex SHA-256 of `bytes`, as persisted in `ciphertext_checksum`.
pub fn checksum_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
