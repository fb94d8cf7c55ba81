//! Share requests and share links.
//!
//! Requests move `pending → approved | rejected | cancelled`; only owners
//! approve. Approval consumes the crypto artifacts the owner's client built
//! (LSK wrap, per-document DEK rewraps) and is the single moment the
//! plaintext link token and the Vendor Secret leave the system — inside the
//! outbound email.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ApiError;
use crate::audit::{self, ActorType, EventDraft, EventType, RequestMeta};
use crate::authz::{self, Access};
use crate::crypto;
use crate::hashing;
use crate::mail::OutboundMail;
use crate::model::{
    DocType, Role, ShareLink, ShareLinkDocument, ShareRequest, ShareRequestStatus,
    ShareLinkStatus,
};
use crate::vendor_secret::VendorSecret;

use super::{App, AuthContext, decode_b64, decode_b64_array};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    pub vault_id: Uuid,
    pub vendor_label: String,
    #[serde(default)]
    pub vendor_email: Option<String>,
    #[serde(default)]
    pub purpose_notes: Option<String>,
    pub requested_doc_types: Vec<DocType>,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequestResponse {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub created_by_profile_id: Uuid,
    pub vendor_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_email: Option<String>,
    /// Whether the address already appears in this vault's link history.
    /// Present only when the request names a vendor email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_vendor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose_notes: Option<String>,
    pub requested_doc_types: Vec<DocType>,
    pub expires_at: u64,
    pub status: ShareRequestStatus,
    pub created_at: u64,
}

/// One DEK rewrapped under the link's LSK, as built by the owner's client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDocumentKeyPayload {
    pub document_id: Uuid,
    /// 60-byte wrap blob, base64.
    pub encrypted_dek: String,
    /// 12 bytes, base64. Diagnostic sibling of the in-blob nonce.
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveShareRequest {
    /// 16 bytes, base64.
    pub lsk_salt: String,
    /// 12 bytes, base64.
    pub lsk_nonce: String,
    /// 60-byte wrap blob, base64.
    pub encrypted_lsk_for_vendor: String,
    pub encrypted_dek_for_link: Vec<LinkDocumentKeyPayload>,
    /// Dash-grouped Vendor Secret; emailed to the vendor, never persisted.
    pub vendor_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub id: Uuid,
    pub vault_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_request_id: Option<Uuid>,
    pub status: ShareLinkStatus,
    pub vendor_label: String,
    pub vendor_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose_notes: Option<String>,
    pub expires_at: u64,
    pub approved_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<u64>,
}

impl From<ShareLink> for LinkResponse {
    fn from(l: ShareLink) -> Self {
        Self {
            id: l.id,
            vault_id: l.vault_id,
            share_request_id: l.share_request_id,
            status: l.status,
            vendor_label: l.vendor_label,
            vendor_email: l.vendor_email,
            purpose_notes: l.purpose_notes,
            expires_at: l.expires_at,
            approved_at: l.approved_at,
            revoked_at: l.revoked_at,
        }
    }
}

/// `GET /links/{id}` is dual: a UUID segment is the authenticated path, any
/// other segment is treated as a vendor token.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LinkLookup {
    Authenticated(LinkResponse),
    Vendor(super::VendorLinkInfo),
}

impl App {
    /// `POST /share-requests`. Delegates may only request doc types their
    /// membership grants.
    pub fn share_request_create(
        &self,
        ctx: &AuthContext,
        meta: &RequestMeta,
        req: CreateShareRequest,
    ) -> Result<ShareRequestResponse, ApiError> {
        let (profile, access) =
            authz::require(self.store(), req.vault_id, &ctx.external_user_id, None)?;

        if req.vendor_label.trim().is_empty() {
            return Err(ApiError::validation("vendorLabel", "must not be empty"));
        }
        let mut doc_types = req.requested_doc_types.clone();
        doc_types.sort();
        doc_types.dedup();
        if doc_types.is_empty() {
            return Err(ApiError::validation("requestedDocTypes", "must not be empty"));
        }
        let now = self.now();
        if req.expires_at <= now {
            return Err(ApiError::validation("expiresAt", "must be in the future"));
        }

        for doc_type in &doc_types {
            if !access.allows_doc_type(*doc_type) {
                return Err(ApiError::Forbidden);
            }
        }

        let request = ShareRequest {
            id: Uuid::new_v4(),
            vault_id: req.vault_id,
            created_by_profile_id: profile.id,
            vendor_label: req.vendor_label,
            vendor_email: req.vendor_email,
            purpose_notes: req.purpose_notes,
            requested_doc_types: doc_types,
            expires_at: req.expires_at,
            status: ShareRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.store().insert_share_request(request.clone())?;

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                req.vault_id,
                access.actor_type(),
                profile.id.to_string(),
                EventType::ShareRequestCreated,
            ),
        )?;

        self.share_request_response(request)
    }

    /// `GET /share-requests?vaultId=`.
    pub fn share_requests_list(
        &self,
        ctx: &AuthContext,
        vault_id: Uuid,
    ) -> Result<Vec<ShareRequestResponse>, ApiError> {
        authz::require(self.store(), vault_id, &ctx.external_user_id, None)?;
        let requests = self.store().share_requests_for_vault(vault_id)?;
        requests
            .into_iter()
            .map(|r| self.share_request_response(r))
            .collect()
    }

    /// `GET /share-requests/{id}`.
    pub fn share_request_get(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<ShareRequestResponse, ApiError> {
        let request = self
            .store()
            .share_request_by_id(request_id)?
            .ok_or(ApiError::NotFound)?;
        authz::require(self.store(), request.vault_id, &ctx.external_user_id, None)?;
        self.share_request_response(request)
    }

    /// `POST /share-requests/{id}/approve`. Owner only. Validates the client
    /// artifacts, creates the approved link, emails the token and Vendor
    /// Secret, and never stores either.
    pub fn share_request_approve(
        &self,
        ctx: &AuthContext,
        meta: &RequestMeta,
        request_id: Uuid,
        req: ApproveShareRequest,
    ) -> Result<LinkResponse, ApiError> {
        let mut request = self
            .store()
            .share_request_by_id(request_id)?
            .ok_or(ApiError::NotFound)?;
        let (profile, _) = authz::require(
            self.store(),
            request.vault_id,
            &ctx.external_user_id,
            Some(Role::Owner),
        )?;

        if request.status != ShareRequestStatus::Pending {
            return Err(ApiError::validation("status", "request is not pending"));
        }
        let vendor_email = request
            .vendor_email
            .clone()
            .ok_or_else(|| ApiError::validation("vendorEmail", "request has no vendor email"))?;

        let vendor_secret = VendorSecret::normalize(&req.vendor_secret)?;
        let lsk_salt: [u8; 16] = decode_b64_array("lskSalt", &req.lsk_salt)?;
        let lsk_nonce: [u8; 12] = decode_b64_array("lskNonce", &req.lsk_nonce)?;
        let encrypted_lsk_for_vendor =
            decode_b64("encryptedLskForVendor", &req.encrypted_lsk_for_vendor)?;
        if encrypted_lsk_for_vendor.len() != crypto::WRAP_BLOB_LEN {
            return Err(ApiError::validation("encryptedLskForVendor", "unexpected length"));
        }

        // The rewrap set must cover exactly the requested doc types, with
        // every document resident in this vault.
        let vault_docs = self.store().documents_for_vault(request.vault_id)?;
        let mut covered: Vec<DocType> = Vec::new();
        let mut link_docs: Vec<ShareLinkDocument> = Vec::new();
        for entry in &req.encrypted_dek_for_link {
            let doc = vault_docs
                .iter()
                .find(|d| d.id == entry.document_id)
                .ok_or_else(|| {
                    ApiError::validation("encryptedDekForLink", "unknown document id")
                })?;
            if !request.requested_doc_types.contains(&doc.doc_type) {
                return Err(ApiError::validation(
                    "encryptedDekForLink",
                    "document type was not requested",
                ));
            }
            if covered.contains(&doc.doc_type) {
                return Err(ApiError::validation(
                    "encryptedDekForLink",
                    "duplicate document type",
                ));
            }
            let encrypted_dek = decode_b64("encryptedDekForLink", &entry.encrypted_dek)?;
            if encrypted_dek.len() != crypto::WRAP_BLOB_LEN {
                return Err(ApiError::validation("encryptedDekForLink", "unexpected length"));
            }
            let dek_for_link_nonce: [u8; 12] = decode_b64_array("nonce", &entry.nonce)?;

            covered.push(doc.doc_type);
            link_docs.push(ShareLinkDocument {
                share_link_id: Uuid::nil(), // set below once the link id exists
                document_id: doc.id,
                doc_type: doc.doc_type,
                encrypted_dek_for_link: encrypted_dek,
                dek_for_link_nonce,
            });
        }
        for requested in &request.requested_doc_types {
            if !covered.contains(requested) {
                return Err(ApiError::validation(
                    "encryptedDekForLink",
                    "missing a requested document type",
                ));
            }
        }

        let token = hashing::generate_token();
        let now = self.now();
        let link = ShareLink {
            id: Uuid::new_v4(),
            vault_id: request.vault_id,
            share_request_id: Some(request.id),
            created_by_profile_id: request.created_by_profile_id,
            approved_by_profile_id: profile.id,
            status: ShareLinkStatus::Approved,
            vendor_label: request.vendor_label.clone(),
            vendor_email: vendor_email.clone(),
            purpose_notes: request.purpose_notes.clone(),
            expires_at: request.expires_at,
            approved_at: now,
            revoked_at: None,
            token_hash: hashing::token_hash(&self.config.token_hash_pepper, &token),
            encrypted_lsk_for_vendor,
            lsk_salt,
            lsk_nonce,
        };
        self.store().insert_share_link(link.clone())?;
        for mut link_doc in link_docs {
            link_doc.share_link_id = link.id;
            self.store().insert_share_link_document(link_doc)?;
        }

        request.status = ShareRequestStatus::Approved;
        request.updated_at = now;
        self.store().update_share_request(request.clone())?;

        // One-shot emission of the token and the Vendor Secret. A mail outage
        // does not roll the approval back; the owner can revoke and reissue.
        let mail = OutboundMail::ShareApproval {
            to: vendor_email,
            vendor_label: link.vendor_label.clone(),
            link_url: format!("{}/v/{token}", self.config.app_url),
            vendor_secret: vendor_secret.to_dashed_string(),
        };
        if let Err(err) = self.mailer.send(mail) {
            warn!(link_id = %link.id, %err, "approval mail not delivered");
        }

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                link.vault_id,
                ActorType::Owner,
                profile.id.to_string(),
                EventType::ShareRequestApproved,
            )
            .link(link.id),
        )?;
        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                link.vault_id,
                ActorType::Owner,
                profile.id.to_string(),
                EventType::LinkCreated,
            )
            .link(link.id),
        )?;

        info!(link_id = %link.id, "share request approved");
        Ok(link.into())
    }

    /// `POST /share-requests/{id}/reject`. Owner only.
    pub fn share_request_reject(
        &self,
        ctx: &AuthContext,
        meta: &RequestMeta,
        request_id: Uuid,
    ) -> Result<ShareRequestResponse, ApiError> {
        let mut request = self
            .store()
            .share_request_by_id(request_id)?
            .ok_or(ApiError::NotFound)?;
        let (profile, _) = authz::require(
            self.store(),
            request.vault_id,
            &ctx.external_user_id,
            Some(Role::Owner),
        )?;

        if request.status != ShareRequestStatus::Pending {
            return Err(ApiError::validation("status", "request is not pending"));
        }
        request.status = ShareRequestStatus::Rejected;
        request.updated_at = self.now();
        self.store().update_share_request(request.clone())?;

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                request.vault_id,
                ActorType::Owner,
                profile.id.to_string(),
                EventType::ShareRequestRejected,
            ),
        )?;
        self.share_request_response(request)
    }

    /// `POST /share-requests/{id}/cancel`. The creator withdraws their own
    /// pending request.
    pub fn share_request_cancel(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<ShareRequestResponse, ApiError> {
        let mut request = self
            .store()
            .share_request_by_id(request_id)?
            .ok_or(ApiError::NotFound)?;
        let (profile, _) =
            authz::require(self.store(), request.vault_id, &ctx.external_user_id, None)?;

        if request.created_by_profile_id != profile.id {
            return Err(ApiError::Forbidden);
        }
        if request.status != ShareRequestStatus::Pending {
            return Err(ApiError::validation("status", "request is not pending"));
        }
        request.status = ShareRequestStatus::Cancelled;
        request.updated_at = self.now();
        self.store().update_share_request(request.clone())?;
        self.share_request_response(request)
    }

    /// `GET /links?vaultId=`. Owners see every link; delegates see the links
    /// they created or that came from their requests.
    pub fn links_list(
        &self,
        ctx: &AuthContext,
        vault_id: Uuid,
    ) -> Result<Vec<LinkResponse>, ApiError> {
        let (profile, access) =
            authz::require(self.store(), vault_id, &ctx.external_user_id, None)?;
        let links = self.store().share_links_for_vault(vault_id)?;

        let visible = match access {
            Access::Owner => links,
            Access::Delegate(_) => links
                .into_iter()
                .filter(|l| self.delegate_sees_link(profile.id, l))
                .collect(),
        };
        Ok(visible.into_iter().map(Into::into).collect())
    }

    /// The authenticated half of `GET /links/{id}`.
    pub fn link_get(&self, ctx: &AuthContext, link_id: Uuid) -> Result<LinkResponse, ApiError> {
        let link = self
            .store()
            .share_link_by_id(link_id)?
            .ok_or(ApiError::NotFound)?;
        let (profile, access) =
            authz::require(self.store(), link.vault_id, &ctx.external_user_id, None)?;

        if matches!(access, Access::Delegate(_)) && !self.delegate_sees_link(profile.id, &link) {
            return Err(ApiError::Forbidden);
        }
        Ok(link.into())
    }

    /// `GET /links/{id}` dual dispatch: UUID means the authenticated path,
    /// anything else is treated as a vendor token. A vendor token is 43
    /// base64url characters and can never parse as a UUID.
    pub fn link_lookup(
        &self,
        ctx: Option<&AuthContext>,
        id_or_token: &str,
    ) -> Result<LinkLookup, ApiError> {
        match Uuid::try_parse(id_or_token) {
            Ok(link_id) => {
                let ctx = ctx.ok_or(ApiError::Unauthenticated)?;
                Ok(LinkLookup::Authenticated(self.link_get(ctx, link_id)?))
            }
            Err(_) => Ok(LinkLookup::Vendor(self.vendor_link_info(id_or_token)?)),
        }
    }

    /// `POST /links/{id}/revoke`. Owners revoke any link; delegates only
    /// their own. Idempotent on an already-revoked link.
    pub fn link_revoke(
        &self,
        ctx: &AuthContext,
        meta: &RequestMeta,
        link_id: Uuid,
    ) -> Result<LinkResponse, ApiError> {
        let mut link = self
            .store()
            .share_link_by_id(link_id)?
            .ok_or(ApiError::NotFound)?;
        let (profile, access) =
            authz::require(self.store(), link.vault_id, &ctx.external_user_id, None)?;

        if matches!(access, Access::Delegate(_)) && !self.delegate_sees_link(profile.id, &link) {
            return Err(ApiError::Forbidden);
        }

        if link.status == ShareLinkStatus::Revoked {
            return Ok(link.into());
        }

        link.status = ShareLinkStatus::Revoked;
        link.revoked_at = Some(self.now());
        self.store().update_share_link(link.clone())?;

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                link.vault_id,
                access.actor_type(),
                profile.id.to_string(),
                EventType::LinkRevoked,
            )
            .link(link.id),
        )?;

        info!(link_id = %link.id, "link revoked");
        Ok(link.into())
    }

    /// Build the response shape, annotating whether the vendor address is
    /// already known to this vault.
    fn share_request_response(
        &self,
        r: ShareRequest,
    ) -> Result<ShareRequestResponse, ApiError> {
        let known_vendor = match r.vendor_email.as_deref() {
            Some(email) => Some(self.vendor_seen_before(r.vault_id, email)?),
            None => None,
        };
        Ok(ShareRequestResponse {
            id: r.id,
            vault_id: r.vault_id,
            created_by_profile_id: r.created_by_profile_id,
            vendor_label: r.vendor_label,
            vendor_email: r.vendor_email,
            known_vendor,
            purpose_notes: r.purpose_notes,
            requested_doc_types: r.requested_doc_types,
            expires_at: r.expires_at,
            status: r.status,
            created_at: r.created_at,
        })
    }

    /// Address-book equality against the vault's link history: both sides are
    /// hashed under `VENDOR_EMAIL_HASH_SALT`, so matching happens on salted
    /// hashes rather than plaintext comparison.
    fn vendor_seen_before(&self, vault_id: Uuid, email: &str) -> Result<bool, ApiError> {
        let needle = hashing::hash_vendor_email(&self.config.vendor_email_hash_salt, email);
        Ok(self
            .store()
            .share_links_for_vault(vault_id)?
            .iter()
            .any(|l| {
                hashing::hash_vendor_email(&self.config.vendor_email_hash_salt, &l.vendor_email)
                    == needle
            }))
    }

    fn delegate_sees_link(&self, profile_id: Uuid, link: &ShareLink) -> bool {
        if link.created_by_profile_id == profile_id {
            return true;
        }
        link.share_request_id
            .and_then(|id| self.store().share_request_by_id(id).ok().flatten())
            .is_some_and(|r| r.created_by_profile_id == profile_id)
    }
}
