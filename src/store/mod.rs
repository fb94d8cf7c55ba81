//! Relational-store seam.
//!
//! The trait covers exactly the tables the service layer needs; the real
//! deployment backs it with a SQL database, while [`MemoryStore`] backs the
//! test suite and in-process embedders. Uniqueness constraints (one vault per
//! owner, one document per `(vault, doc_type)`, unique token hashes) are the
//! store's responsibility and surface as typed errors.

mod memory;

pub use memory::MemoryStore;

use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditEvent;
use crate::model::{
    Document, OtpChallenge, ShareLink, ShareLinkDocument, ShareRequest, TeamInvite,
    TeamMembership, UserProfile, Vault,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a vault already exists for this owner")]
    VaultExists,

    #[error("token hash collision")]
    TokenHashExists,

    #[error("row not found")]
    NotFound,

    #[error("storage backend unavailable")]
    Unavailable,
}

pub trait Store: Send + Sync {
    // -- user profiles

    /// Get-or-create the profile for an identity-provider user id.
    fn upsert_profile(&self, external_user_id: &str) -> Result<UserProfile, StoreError>;
    fn profile_by_external_id(
        &self,
        external_user_id: &str,
    ) -> Result<Option<UserProfile>, StoreError>;
    fn profile_by_id(&self, id: Uuid) -> Result<Option<UserProfile>, StoreError>;

    // -- vaults

    /// Fails with `VaultExists` if the owner already has one.
    fn insert_vault(&self, vault: Vault) -> Result<(), StoreError>;
    fn vault_by_id(&self, id: Uuid) -> Result<Option<Vault>, StoreError>;
    fn vault_by_owner(&self, owner_profile_id: Uuid) -> Result<Option<Vault>, StoreError>;

    // -- documents

    /// Create or replace the row for `(vault_id, doc_type)`. Returns `true`
    /// if a predecessor was replaced, along with the predecessor itself so
    /// the caller can supersede its blob.
    fn upsert_document(&self, doc: Document) -> Result<Option<Document>, StoreError>;
    fn document_by_id(&self, id: Uuid) -> Result<Option<Document>, StoreError>;
    fn documents_for_vault(&self, vault_id: Uuid) -> Result<Vec<Document>, StoreError>;

    // -- share requests

    fn insert_share_request(&self, request: ShareRequest) -> Result<(), StoreError>;
    fn share_request_by_id(&self, id: Uuid) -> Result<Option<ShareRequest>, StoreError>;
    fn share_requests_for_vault(&self, vault_id: Uuid) -> Result<Vec<ShareRequest>, StoreError>;
    fn update_share_request(&self, request: ShareRequest) -> Result<(), StoreError>;

    // -- share links

    /// Fails with `TokenHashExists` on a token-hash collision.
    fn insert_share_link(&self, link: ShareLink) -> Result<(), StoreError>;
    fn share_link_by_id(&self, id: Uuid) -> Result<Option<ShareLink>, StoreError>;
    fn share_link_by_token_hash(&self, token_hash: &str)
    -> Result<Option<ShareLink>, StoreError>;
    fn share_links_for_vault(&self, vault_id: Uuid) -> Result<Vec<ShareLink>, StoreError>;
    fn update_share_link(&self, link: ShareLink) -> Result<(), StoreError>;

    fn insert_share_link_document(&self, doc: ShareLinkDocument) -> Result<(), StoreError>;
    fn documents_for_link(&self, link_id: Uuid) -> Result<Vec<ShareLinkDocument>, StoreError>;

    // -- team

    fn insert_membership(&self, membership: TeamMembership) -> Result<(), StoreError>;
    fn membership(
        &self,
        vault_id: Uuid,
        profile_id: Uuid,
    ) -> Result<Option<TeamMembership>, StoreError>;
    fn memberships_for_vault(&self, vault_id: Uuid) -> Result<Vec<TeamMembership>, StoreError>;
    fn memberships_for_profile(&self, profile_id: Uuid)
    -> Result<Vec<TeamMembership>, StoreError>;

    fn insert_invite(&self, invite: TeamInvite) -> Result<(), StoreError>;
    fn invite_by_token_hash(&self, token_hash: &str) -> Result<Option<TeamInvite>, StoreError>;
    fn invites_for_vault(&self, vault_id: Uuid) -> Result<Vec<TeamInvite>, StoreError>;
    fn update_invite(&self, invite: TeamInvite) -> Result<(), StoreError>;

    // -- otp challenges

    fn insert_otp_challenge(&self, challenge: OtpChallenge) -> Result<(), StoreError>;
    /// In insertion order, oldest first.
    fn otp_challenges_for_link(&self, link_id: Uuid) -> Result<Vec<OtpChallenge>, StoreError>;
    fn update_otp_challenge(&self, challenge: OtpChallenge) -> Result<(), StoreError>;

    // -- audit

    /// Append-only; there is no update or delete.
    fn append_audit_event(&self, event: AuditEvent) -> Result<(), StoreError>;
    /// Newest-first, capped; ties on `created_at` break by insertion order.
    fn audit_events_for_vault(
        &self,
        vault_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}
