//! Vault lifecycle: initialization, the unlock contract, and the three-phase
//! document upload (prepare, put blob, commit).

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::ApiError;
use crate::audit::{self, EventDraft, EventType, RequestMeta};
use crate::authz::Access;
use crate::crypto::{self, KdfParams};
use crate::model::{DocType, Document, Role, Vault};

use super::{App, AuthContext, decode_b64_array, decode_b64, encode_b64, storage_path};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultInitRequest {
    /// 16 bytes, base64.
    pub kdf_salt: String,
    pub kdf_params: KdfParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultInitResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatusResponse {
    pub id: Uuid,
    pub role: Role,
    /// Present for owners only: what the client needs to derive the KEK.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdf_salt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdf_params: Option<KdfParams>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUploadRequest {
    pub doc_type: DocType,
    pub filename: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUploadResponse {
    pub doc_id: Uuid,
    pub storage_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitUploadRequest {
    pub doc_id: Uuid,
    pub doc_type: DocType,
    pub storage_path: String,
    pub filename: String,
    pub size: u64,
    /// Hex SHA-256 the client computed before upload.
    pub ciphertext_checksum: String,
    /// 60-byte wrap blob, base64.
    pub encrypted_dek_for_owner: String,
    /// 12 bytes, base64. Diagnostic sibling of the in-blob nonce.
    pub dek_nonce: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitUploadResponse {
    pub id: Uuid,
    pub replaced: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub id: Uuid,
    pub doc_type: DocType,
    pub filename: String,
    pub size: u64,
    pub ciphertext_checksum: String,
    pub uploaded_at: u64,
    /// Wrap fields are owner-only; delegates see metadata alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_dek_for_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dek_nonce: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub id: Uuid,
    pub doc_type: DocType,
    pub filename: String,
    pub size: u64,
    pub storage_path: String,
    pub ciphertext_checksum: String,
    pub encrypted_dek_for_owner: String,
    pub dek_nonce: String,
}

impl App {
    /// `POST /vault/init`. The owner's client generates the KDF salt and
    /// parameters; the server only persists them. One vault per owner.
    pub fn vault_init(
        &self,
        ctx: &AuthContext,
        req: VaultInitRequest,
    ) -> Result<VaultInitResponse, ApiError> {
        let kdf_salt: [u8; 16] = decode_b64_array("kdfSalt", &req.kdf_salt)?;
        if req.kdf_params.memory_kib == 0
            || req.kdf_params.time_cost == 0
            || req.kdf_params.parallelism == 0
        {
            return Err(ApiError::validation("kdfParams", "all parameters must be positive"));
        }

        let profile = self.store().upsert_profile(&ctx.external_user_id)?;
        let now = self.now();
        let vault = Vault {
            id: Uuid::new_v4(),
            owner_profile_id: profile.id,
            kdf_salt,
            kdf_params: req.kdf_params,
            created_at: now,
            updated_at: now,
        };
        self.store().insert_vault(vault.clone())?;

        info!(vault_id = %vault.id, "vault initialized");
        Ok(VaultInitResponse { id: vault.id })
    }

    /// `GET /vault/status`. Owners receive the KDF material needed to unlock;
    /// delegates receive the vault id and their role only.
    pub fn vault_status(&self, ctx: &AuthContext) -> Result<VaultStatusResponse, ApiError> {
        let (vault, access) = self.vault_for_user(ctx)?.ok_or(ApiError::NotFound)?;

        Ok(match access {
            Access::Owner => VaultStatusResponse {
                id: vault.id,
                role: Role::Owner,
                kdf_salt: Some(encode_b64(&vault.kdf_salt)),
                kdf_params: Some(vault.kdf_params),
            },
            Access::Delegate(_) => VaultStatusResponse {
                id: vault.id,
                role: Role::Delegate,
                kdf_salt: None,
                kdf_params: None,
            },
        })
    }

    /// Unlock notification from the owner client, written to the audit log
    /// after the KEK has been derived and proven against a wrapped DEK.
    pub fn vault_unlocked(&self, ctx: &AuthContext, meta: &RequestMeta) -> Result<(), ApiError> {
        let (vault, profile_id) = self.owned_vault(ctx)?;
        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                vault.id,
                crate::audit::ActorType::Owner,
                profile_id.to_string(),
                EventType::VaultUnlocked,
            ),
        )?;
        Ok(())
    }

    /// `POST /documents/prepare-upload`. Assigns a fresh document id and its
    /// canonical storage path. No row is created yet.
    pub fn prepare_upload(
        &self,
        ctx: &AuthContext,
        req: PrepareUploadRequest,
    ) -> Result<PrepareUploadResponse, ApiError> {
        let (vault, _) = self.owned_vault(ctx)?;
        if req.filename.trim().is_empty() {
            return Err(ApiError::validation("filename", "must not be empty"));
        }
        if req.size == 0 {
            return Err(ApiError::validation("size", "must be positive"));
        }

        let doc_id = Uuid::new_v4();
        Ok(PrepareUploadResponse {
            storage_path: storage_path(vault.id, req.doc_type, doc_id),
            doc_id,
        })
    }

    /// The put-blob phase, via the server's blob adapter. The path must be
    /// one this vault's prepare step could have issued.
    pub fn upload_ciphertext(
        &self,
        ctx: &AuthContext,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), ApiError> {
        let (vault, _) = self.owned_vault(ctx)?;
        if !path.starts_with(&format!("vaults/{}/", vault.id)) {
            return Err(ApiError::validation("storagePath", "path outside vault"));
        }
        self.blobs.put_upsert(path, bytes)?;
        Ok(())
    }

    /// `POST /documents/commit-upload`. Creates or atomically replaces the
    /// row for `(vault, docType)`. Commit only transitions database rows; the
    /// blob was written in the prior put step.
    pub fn commit_upload(
        &self,
        ctx: &AuthContext,
        meta: &RequestMeta,
        req: CommitUploadRequest,
    ) -> Result<CommitUploadResponse, ApiError> {
        let (vault, profile_id) = self.owned_vault(ctx)?;

        let canonical = storage_path(vault.id, req.doc_type, req.doc_id);
        if req.storage_path != canonical {
            return Err(ApiError::validation("storagePath", "not the prepared path"));
        }

        let encrypted_dek_for_owner = decode_b64("encryptedDekForOwner", &req.encrypted_dek_for_owner)?;
        if encrypted_dek_for_owner.len() != crypto::WRAP_BLOB_LEN {
            return Err(ApiError::validation("encryptedDekForOwner", "unexpected length"));
        }
        let dek_nonce: [u8; 12] = decode_b64_array("dekNonce", &req.dek_nonce)?;

        let blob = self.blobs.get(&req.storage_path)?;
        if crypto::checksum_hex(&blob) != req.ciphertext_checksum {
            return Err(ApiError::validation(
                "ciphertextChecksum",
                "stored blob does not match the declared checksum",
            ));
        }

        let doc = Document {
            id: req.doc_id,
            vault_id: vault.id,
            doc_type: req.doc_type,
            storage_path: req.storage_path,
            filename: req.filename,
            size: req.size,
            ciphertext_checksum: req.ciphertext_checksum,
            encrypted_dek_for_owner,
            dek_nonce,
            uploaded_at: self.now(),
            last_updated_by_profile_id: profile_id,
        };
        let storage = doc.storage_path.clone();
        let predecessor = self.store().upsert_document(doc)?;

        // A replaced document leaves its superseded blob behind at the old
        // path; remove it so the prior content is no longer retrievable.
        if let Some(prior) = &predecessor {
            if prior.storage_path != storage {
                if let Err(err) = self.blobs.delete(&prior.storage_path) {
                    tracing::warn!(path = %prior.storage_path, %err, "superseded blob not deleted");
                }
            }
        }

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                vault.id,
                crate::audit::ActorType::Owner,
                profile_id.to_string(),
                EventType::DocumentUploaded,
            )
            .doc_type(req.doc_type),
        )?;

        info!(vault_id = %vault.id, doc_type = req.doc_type.as_str(), "document committed");
        Ok(CommitUploadResponse {
            id: req.doc_id,
            replaced: predecessor.is_some(),
        })
    }

    /// `GET /documents`. Owners receive wrap fields; delegates do not.
    pub fn documents_list(&self, ctx: &AuthContext) -> Result<Vec<DocumentEntry>, ApiError> {
        let (vault, access) = self.vault_for_user(ctx)?.ok_or(ApiError::NotFound)?;
        let docs = self.store().documents_for_vault(vault.id)?;

        let include_wraps = matches!(access, Access::Owner);
        Ok(docs
            .into_iter()
            .map(|d| DocumentEntry {
                id: d.id,
                doc_type: d.doc_type,
                filename: d.filename,
                size: d.size,
                ciphertext_checksum: d.ciphertext_checksum,
                uploaded_at: d.uploaded_at,
                encrypted_dek_for_owner: include_wraps
                    .then(|| encode_b64(&d.encrypted_dek_for_owner)),
                dek_nonce: include_wraps.then(|| encode_b64(&d.dek_nonce)),
            })
            .collect())
    }

    /// `GET /documents/{id}/download-info`. Owners only.
    pub fn document_download_info(
        &self,
        ctx: &AuthContext,
        doc_id: Uuid,
    ) -> Result<DownloadInfo, ApiError> {
        let (vault, _) = self.owned_vault(ctx)?;
        let doc = self.owned_document(vault.id, doc_id)?;

        Ok(DownloadInfo {
            id: doc.id,
            doc_type: doc.doc_type,
            filename: doc.filename,
            size: doc.size,
            storage_path: doc.storage_path,
            ciphertext_checksum: doc.ciphertext_checksum,
            encrypted_dek_for_owner: encode_b64(&doc.encrypted_dek_for_owner),
            dek_nonce: encode_b64(&doc.dek_nonce),
        })
    }

    /// `GET /documents/{id}/ciphertext`. Owners only; raw blob bytes.
    pub fn document_ciphertext(
        &self,
        ctx: &AuthContext,
        doc_id: Uuid,
    ) -> Result<Vec<u8>, ApiError> {
        let (vault, _) = self.owned_vault(ctx)?;
        let doc = self.owned_document(vault.id, doc_id)?;
        Ok(self.blobs.get(&doc.storage_path)?)
    }

    /// The caller's own vault, or `Forbidden`. Owner-only operations route
    /// through here.
    fn owned_vault(&self, ctx: &AuthContext) -> Result<(Vault, Uuid), ApiError> {
        let profile = self
            .store()
            .profile_by_external_id(&ctx.external_user_id)?
            .ok_or(ApiError::Forbidden)?;
        let vault = self
            .store()
            .vault_by_owner(profile.id)?
            .ok_or(ApiError::Forbidden)?;
        Ok((vault, profile.id))
    }

    fn owned_document(&self, vault_id: Uuid, doc_id: Uuid) -> Result<Document, ApiError> {
        let doc = self
            .store()
            .document_by_id(doc_id)?
            .ok_or(ApiError::NotFound)?;
        if doc.vault_id != vault_id {
            return Err(ApiError::Forbidden);
        }
        Ok(doc)
    }
}
