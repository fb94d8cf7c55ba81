//! Key derivation: Argon2id for the password-derived KEK, HKDF-SHA256 for the
//! Vendor-Secret-derived wrap key.

use argon2::{Algorithm, Argon2, Params as Argon2Params, Version};
use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{CryptoError, KEY_LEN, SecretBytes};

/// HKDF `info` label for the vendor wrap key. Domain-separates K_wrap from any
/// other key derived from the same IKM.
const HKDF_INFO_LSK_WRAP: &[u8] = b"lsk-wrap";

/// Argon2id tuning parameters, persisted on the vault at creation and reused
/// for every unlock. They are not secret but are required to derive the KEK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    #[serde(rename = "time")]
    pub time_cost: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Defaults selected at vault creation.
    pub fn recommended() -> Self {
        Self {
            memory_kib: 65536,
            time_cost: 12,
            parallelism: 4,
        }
    }

    /// Cheap parameters so the test suite does not spend its time in Argon2.
    pub fn for_tests() -> Self {
        Self {
            memory_kib: 8 * 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn to_argon2_params(self, output_len: usize) -> Result<Argon2Params, CryptoError> {
        Ok(Argon2Params::new(
            self.memory_kib,
            self.time_cost,
            self.parallelism,
            Some(output_len),
        )?)
    }
}

/// Derive the 32-byte KEK from the master password using Argon2id.
///
/// Callers are expected to treat the returned bytes as sensitive and avoid
/// copying them unnecessarily; the KEK never leaves client memory.
pub fn derive_kek(
    password_bytes: &[u8],
    salt: &[u8],
    params: KdfParams,
) -> Result<SecretBytes, CryptoError> {
    let argon2_params = params.to_argon2_params(KEY_LEN)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut out = vec![0u8; KEY_LEN];
    argon2.hash_password_into(password_bytes, salt, &mut out)?;
    Ok(SecretBytes::from(out))
}

/// Convenience wrapper for `derive_kek` using a `SecretString`.
pub fn derive_kek_from_password(
    password: &SecretString,
    salt: &[u8],
    params: KdfParams,
) -> Result<SecretBytes, CryptoError> {
    derive_kek(password.expose_secret().as_bytes(), salt, params)
}

/// Derive the vendor wrap key K_wrap from the Vendor Secret payload bytes:
/// `HKDF-SHA256(ikm = vs_bytes, salt = lsk_salt, info = "lsk-wrap", L = 32)`.
pub fn hkdf_vendor_wrap(vs_bytes: &[u8], lsk_salt: &[u8]) -> Result<SecretBytes, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(lsk_salt), vs_bytes);

    let mut k_wrap = vec![0u8; KEY_LEN];
    hk.expand(HKDF_INFO_LSK_WRAP, &mut k_wrap)
        .map_err(|_| CryptoError::Hkdf)?;
    Ok(SecretBytes::from(k_wrap))
}
