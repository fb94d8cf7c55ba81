//! The endpoint surface: one method per operation, transport-agnostic.
//!
//! [`App`] holds the trait seams (relational store, blob store, mailer), the
//! process configuration, and the clock. Request/response types mirror the
//! JSON bodies of the HTTP surface: camelCase fields, binary values as
//! base64 strings. Every method returns `Result<T, ApiError>`; the transport
//! adapter maps errors to status codes.

mod sharing;
mod team;
mod vault;
mod vendor;

pub use sharing::{
    ApproveShareRequest, CreateShareRequest, LinkDocumentKeyPayload, LinkLookup, LinkResponse,
    ShareRequestResponse,
};
pub use team::{
    InviteCreateRequest, InviteCreateResponse, InviteEntry, InvitePreview, MemberEntry,
    MembershipResponse,
};
pub use vault::{
    CommitUploadRequest, CommitUploadResponse, DocumentEntry, DownloadInfo, PrepareUploadRequest,
    PrepareUploadResponse, VaultInitRequest, VaultInitResponse, VaultStatusResponse,
};
pub use vendor::{
    OtpSendRequest, OtpSendResponse, OtpVerifyRequest, OtpVerifyResponse, SignedUrlResponse,
    VendorAuditRequest, VendorDocumentEntry, VendorLinkInfo, VendorSession,
};

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use uuid::Uuid;

use crate::api::ApiError;
use crate::audit::{self, AuditEvent};
use crate::authz;
use crate::blob::BlobStore;
use crate::config::Config;
use crate::mail::Mailer;
use crate::model::{DocType, Vault};
use crate::store::Store;
use crate::time::Clock;

/// An authenticated owner/delegate caller, as supplied by the identity
/// provider. Vendors never carry one of these.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub external_user_id: String,
    /// Verified address from the identity provider, when it supplies one.
    /// Required only for invite acceptance.
    pub email: Option<String>,
}

impl AuthContext {
    pub fn new(external_user_id: impl Into<String>) -> Self {
        Self {
            external_user_id: external_user_id.into(),
            email: None,
        }
    }

    pub fn with_email(external_user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            external_user_id: external_user_id.into(),
            email: Some(email.into()),
        }
    }
}

pub struct App {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl App {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            store,
            blobs,
            mailer,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_unix()
    }

    /// The single vault an authenticated user acts on: their own if they are
    /// an owner, else the vault of their delegate membership.
    pub(crate) fn vault_for_user(
        &self,
        ctx: &AuthContext,
    ) -> Result<Option<(Vault, authz::Access)>, ApiError> {
        let Some(profile) = self.store.profile_by_external_id(&ctx.external_user_id)? else {
            return Ok(None);
        };

        if let Some(vault) = self.store.vault_by_owner(profile.id)? {
            return Ok(Some((vault, authz::Access::Owner)));
        }

        if let Some(membership) = self.store.memberships_for_profile(profile.id)?.into_iter().next()
        {
            let vault = self
                .store
                .vault_by_id(membership.vault_id)?
                .ok_or(ApiError::Internal)?;
            return Ok(Some((vault, authz::Access::Delegate(membership.permissions))));
        }

        Ok(None)
    }

    /// `GET /audit?vaultId=&limit=`: vault-scoped, newest-first, capped.
    pub fn audit_read(
        &self,
        ctx: &AuthContext,
        vault_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>, ApiError> {
        authz::require(self.store.as_ref(), vault_id, &ctx.external_user_id, None)?;
        let events = audit::read_events(self.store.as_ref(), vault_id, limit)?;
        Ok(events.into_iter().map(AuditEntry::from).collect())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub actor_type: crate::audit::ActorType,
    pub actor_id: String,
    pub event_type: crate::audit::EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_reference_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub created_at: u64,
}

impl From<AuditEvent> for AuditEntry {
    fn from(e: AuditEvent) -> Self {
        Self {
            id: e.id,
            vault_id: e.vault_id,
            actor_type: e.actor_type,
            actor_id: e.actor_id,
            event_type: e.event_type,
            link_id: e.link_id,
            doc_type: e.doc_type,
            watermark_reference_id: e.watermark_reference_id,
            user_agent: e.user_agent,
            ip: e.ip,
            created_at: e.created_at,
        }
    }
}

/// Canonical blob location for a document.
pub(crate) fn storage_path(vault_id: Uuid, doc_type: DocType, doc_id: Uuid) -> String {
    format!("vaults/{vault_id}/{}/{doc_id}.bin", doc_type.as_str())
}

pub(crate) fn encode_b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub(crate) fn decode_b64(field: &'static str, value: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(value.as_bytes())
        .map_err(|_| ApiError::validation(field, "invalid base64"))
}

pub(crate) fn decode_b64_array<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<[u8; N], ApiError> {
    decode_b64(field, value)?
        .try_into()
        .map_err(|_| ApiError::validation(field, "unexpected length"))
}
