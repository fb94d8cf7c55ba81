//! Persisted data model: the rows behind the relational-store seam.
//!
//! Identifiers are opaque 128-bit UUIDs. Binary columns are raw bytes here;
//! they become base64 strings only at the JSON boundary in the service layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::KdfParams;

/// Document categories a vault may hold, one document per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocType {
    #[serde(rename = "ID")]
    Id,
    ProofOfAddress,
    SourceOfWealth,
}

impl DocType {
    pub const ALL: [DocType; 3] = [DocType::Id, DocType::ProofOfAddress, DocType::SourceOfWealth];

    pub fn as_str(self) -> &'static str {
        match self {
            DocType::Id => "ID",
            DocType::ProofOfAddress => "ProofOfAddress",
            DocType::SourceOfWealth => "SourceOfWealth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Delegate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareRequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareLinkStatus {
    Pending,
    Approved,
    Revoked,
}

/// One per identity-provider user; created on first authenticated action,
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub external_user_id: String,
}

/// Exactly one per owner. KDF params are immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vault {
    pub id: Uuid,
    pub owner_profile_id: Uuid,
    pub kdf_salt: [u8; 16],
    pub kdf_params: KdfParams,
    pub created_at: u64,
    pub updated_at: u64,
}

/// `(vault_id, doc_type)` is unique: a commit for an existing type replaces
/// its predecessor atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub doc_type: DocType,
    pub storage_path: String,
    pub filename: String,
    pub size: u64,
    pub ciphertext_checksum: String,
    pub encrypted_dek_for_owner: Vec<u8>,
    pub dek_nonce: [u8; 12],
    pub uploaded_at: u64,
    pub last_updated_by_profile_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub created_by_profile_id: Uuid,
    pub vendor_label: String,
    pub vendor_email: Option<String>,
    pub purpose_notes: Option<String>,
    pub requested_doc_types: Vec<DocType>,
    pub expires_at: u64,
    pub status: ShareRequestStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

/// The plaintext link token is emitted exactly once, in the outbound approval
/// email; rows carry only its peppered hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub share_request_id: Option<Uuid>,
    pub created_by_profile_id: Uuid,
    pub approved_by_profile_id: Uuid,
    pub status: ShareLinkStatus,
    pub vendor_label: String,
    pub vendor_email: String,
    pub purpose_notes: Option<String>,
    pub expires_at: u64,
    pub approved_at: u64,
    pub revoked_at: Option<u64>,
    pub token_hash: String,
    pub encrypted_lsk_for_vendor: Vec<u8>,
    pub lsk_salt: [u8; 16],
    pub lsk_nonce: [u8; 12],
}

/// One per (link, document): the document DEK rewrapped under the link's LSK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLinkDocument {
    pub share_link_id: Uuid,
    pub document_id: Uuid,
    pub doc_type: DocType,
    pub encrypted_dek_for_link: Vec<u8>,
    pub dek_for_link_nonce: [u8; 12],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub allowed_doc_types: Vec<DocType>,
}

impl Permissions {
    pub fn allows(&self, doc_type: DocType) -> bool {
        self.allowed_doc_types.contains(&doc_type)
    }
}

/// Owner is implicit via `Vault.owner_profile_id` and holds all doc types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMembership {
    pub vault_id: Uuid,
    pub profile_id: Uuid,
    pub role: Role,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamInvite {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub invited_email: String,
    pub role: Role,
    pub permissions: Permissions,
    pub token_hash: String,
    pub expires_at: u64,
    pub created_at: u64,
    pub accepted_at: Option<u64>,
    pub accepted_by_profile_id: Option<Uuid>,
}

/// OTP challenges self-expire at `created_at + OTP_TTL`; several may coexist
/// for one link after resends, distinguished by the salted email hash.
/// Verification consults the newest match for an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub id: Uuid,
    pub share_link_id: Uuid,
    pub vendor_email_hash: String,
    pub email_salt: [u8; 16],
    pub otp_hash: String,
    pub otp_salt: [u8; 16],
    pub attempts: u32,
    pub expires_at: u64,
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_serializes_to_wire_names() {
        assert_eq!(serde_json::to_string(&DocType::Id).unwrap(), "\"ID\"");
        assert_eq!(
            serde_json::to_string(&DocType::ProofOfAddress).unwrap(),
            "\"ProofOfAddress\""
        );
        let parsed: DocType = serde_json::from_str("\"SourceOfWealth\"").unwrap();
        assert_eq!(parsed, DocType::SourceOfWealth);
    }

    #[test]
    fn statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ShareRequestStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(
            serde_json::to_string(&ShareLinkStatus::Revoked).unwrap(),
            "\"revoked\""
        );
        assert_eq!(serde_json::to_string(&Role::Owner).unwrap(), "\"owner\"");
    }
}
