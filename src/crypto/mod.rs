//! Cryptographic building blocks for the vault key hierarchy.
//!
//! This module intentionally provides small, composable primitives which the
//! service and client layers wire together according to the envelope format
//! and secure defaults.
//!
//! Design notes:
//!
//! - KDF: Argon2id derives the owner KEK from the master password + per-vault
//!   salt; parameters are persisted on the vault and immutable afterwards.
//! - Key hierarchy: a random per-document DEK encrypts the document bytes;
//!   the DEK is wrapped with the KEK. On share approval each DEK is rewrapped
//!   under a random LSK, and the LSK is wrapped under a key HKDF-derived from
//!   the Vendor Secret.
//! - AEAD: AES-256-GCM with 96-bit nonces and 128-bit tags. Nonces must be
//!   unique per key; every seal/wrap draws a fresh random nonce.
//!
//! Security foot-guns to avoid:
//!
//! - Do not log or print keys, plaintext documents, or decrypted secrets.
//! - Treat all returned plaintext bytes as sensitive and keep them in memory
//!   for as short a time as possible.

mod envelope;
mod kdf;

pub use envelope::{
    DOC_BLOB_OVERHEAD, NONCE_LEN, TAG_LEN, WRAP_BLOB_LEN, checksum_hex, doc_blob_nonce, open, seal,
    unwrap_key, wrap_blob_nonce, wrap_key,
};
pub use kdf::{KdfParams, derive_kek, derive_kek_from_password, hkdf_vendor_wrap};

use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::SecretSlice;
use thiserror::Error;

/// Size (bytes) of every symmetric key in the hierarchy (KEK, DEK, LSK, K_wrap).
pub const KEY_LEN: usize = 32;

/// Secret bytes held in memory with zeroize-on-drop semantics.
pub type SecretBytes = SecretSlice<u8>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication failure: tampering, a wrong key, or a wrong secret.
    /// Deliberately carries no detail; callers surface it as "wrong
    /// password/secret".
    #[error("authentication failed")]
    AuthTag,

    #[error("kdf parameters rejected")]
    Kdf(#[from] argon2::Error),

    #[error("hkdf expand failed")]
    Hkdf,

    #[error("blob too short or of unexpected length")]
    MalformedBlob,

    #[error("invalid key length")]
    InvalidKeyLength,
}

/// Generate `N` cryptographically-secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a fresh 32-byte key (DEK or LSK).
pub fn generate_key() -> SecretBytes {
    SecretBytes::from(random_bytes::<KEY_LEN>().to_vec())
}
