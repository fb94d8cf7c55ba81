//! Owner-side crypto: unlock, document encryption, approval artifacts.

use secrecy::SecretString;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{self, CryptoError, KdfParams, SecretBytes};
use crate::vendor_secret::VendorSecret;

/// An unlocked vault session: the KEK, held only in memory. Dropping this
/// zeroizes it; there is no way to extract the key.
pub struct UnlockedVault {
    kek: SecretBytes,
}

/// Everything the three-phase upload protocol needs from the client.
pub struct EncryptedDocument {
    /// `ciphertext || nonce || tag`, destined for the blob store.
    pub blob: Vec<u8>,
    /// Hex SHA-256 of `blob`, computed before upload.
    pub ciphertext_checksum: String,
    /// The document DEK wrapped under the KEK.
    pub encrypted_dek_for_owner: Vec<u8>,
    /// Sibling copy of the wrap nonce.
    pub dek_nonce: [u8; 12],
}

/// One DEK rewrapped under a link's LSK.
pub struct LinkDocumentKey {
    pub document_id: Uuid,
    pub encrypted_dek: Vec<u8>,
    pub nonce: [u8; 12],
}

/// The client half of the approval protocol: the Vendor Secret, the wrapped
/// LSK, and the per-document rewraps, ready to POST.
pub struct ApprovalArtifacts {
    pub vendor_secret: VendorSecret,
    pub lsk_salt: [u8; 16],
    pub lsk_nonce: [u8; 12],
    pub encrypted_lsk_for_vendor: Vec<u8>,
    pub document_keys: Vec<LinkDocumentKey>,
}

/// Derive the KEK from the password and the vault's persisted KDF material.
pub fn unlock(
    password: &SecretString,
    kdf_salt: &[u8],
    kdf_params: KdfParams,
) -> Result<UnlockedVault, CryptoError> {
    let kek = crypto::derive_kek_from_password(password, kdf_salt, kdf_params)?;
    Ok(UnlockedVault { kek })
}

impl UnlockedVault {
    /// Encrypt a document under a fresh DEK and wrap the DEK for storage.
    pub fn encrypt_document(&self, plaintext: &[u8]) -> Result<EncryptedDocument, CryptoError> {
        let dek = crypto::generate_key();
        let blob = crypto::seal(&dek, plaintext)?;
        let encrypted_dek_for_owner = crypto::wrap_key(&self.kek, &dek)?;
        let dek_nonce = crypto::wrap_blob_nonce(&encrypted_dek_for_owner)?;

        Ok(EncryptedDocument {
            ciphertext_checksum: crypto::checksum_hex(&blob),
            blob,
            encrypted_dek_for_owner,
            dek_nonce,
        })
    }

    /// Unwrap a stored DEK and decrypt the blob fetched from storage.
    pub fn decrypt_document(
        &self,
        encrypted_dek_for_owner: &[u8],
        blob: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let dek = crypto::unwrap_key(&self.kek, encrypted_dek_for_owner)?;
        crypto::open(&dek, blob)
    }

    /// Build the approval artifacts for a share: generate the Vendor Secret
    /// and LSK, wrap the LSK under the VS-derived key, and rewrap each
    /// document's DEK under the LSK.
    pub fn build_approval_artifacts(
        &self,
        documents: &[(Uuid, Vec<u8>)],
    ) -> Result<ApprovalArtifacts, CryptoError> {
        let vendor_secret = VendorSecret::generate();
        let lsk = crypto::generate_key();
        let lsk_salt = crypto::random_bytes::<16>();

        let k_wrap = crypto::hkdf_vendor_wrap(vendor_secret.to_ikm_bytes().as_ref(), &lsk_salt)?;
        let encrypted_lsk_for_vendor = crypto::wrap_key(&k_wrap, &lsk)?;
        let lsk_nonce = crypto::wrap_blob_nonce(&encrypted_lsk_for_vendor)?;

        let mut document_keys = Vec::with_capacity(documents.len());
        for (document_id, encrypted_dek_for_owner) in documents {
            let dek = crypto::unwrap_key(&self.kek, encrypted_dek_for_owner)?;
            let encrypted_dek = crypto::wrap_key(&lsk, &dek)?;
            let nonce = crypto::wrap_blob_nonce(&encrypted_dek)?;
            document_keys.push(LinkDocumentKey {
                document_id: *document_id,
                encrypted_dek,
                nonce,
            });
        }

        Ok(ApprovalArtifacts {
            vendor_secret,
            lsk_salt,
            lsk_nonce,
            encrypted_lsk_for_vendor,
            document_keys,
        })
    }
}
