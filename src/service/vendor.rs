//! The vendor access engine.
//!
//! Vendors carry no identity-provider credentials: the link token is the
//! coarse capability, the OTP + Vendor Secret pair the fine one. Every
//! endpoint here re-resolves the link by token hash and re-checks its state;
//! a revoked or expired link answers 410 no matter what session the caller
//! holds.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ApiError;
use crate::audit::{self, ActorType, EventDraft, EventType, RequestMeta};
use crate::crypto;
use crate::hashing;
use crate::mail::OutboundMail;
use crate::model::{DocType, OtpChallenge, ShareLink, ShareLinkStatus};
use crate::session::{self, VendorSessionClaims};

use super::{App, encode_b64};

/// Verification attempts allowed per challenge before it is burned.
pub const MAX_OTP_ATTEMPTS: u32 = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorLinkInfo {
    pub vendor_label: String,
    pub doc_types: Vec<DocType>,
    pub expires_at: u64,
    /// The LSK wrapped for the vendor, opened locally with the Vendor Secret.
    /// Useless without the VS, which travels out of band.
    pub encrypted_lsk_for_vendor: String,
    pub lsk_salt: String,
    pub lsk_nonce: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSendRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSendResponse {
    /// When the challenge self-expires.
    pub expires_at: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifyRequest {
    pub email: String,
    pub otp: String,
}

/// A minted vendor session, ready to be set as a cookie by the transport.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSession {
    pub cookie_name: &'static str,
    pub cookie_value: String,
    pub cookie_attributes: String,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifyResponse {
    pub session: VendorSession,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorDocumentEntry {
    pub document_id: Uuid,
    pub doc_type: DocType,
    pub filename: String,
    pub size: u64,
    pub storage_path: String,
    /// 60-byte wrap blob, base64; opens under the link's LSK.
    pub encrypted_dek_for_link: String,
    pub dek_for_link_nonce: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_at: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorAuditRequest {
    pub event_type: EventType,
    pub doc_type: DocType,
    pub watermark_reference_id: String,
}

impl App {
    /// `GET /vendor/{token}/link-info`: pre-OTP metadata for the landing page.
    pub fn vendor_link_info(&self, token: &str) -> Result<VendorLinkInfo, ApiError> {
        let link = self.active_link_by_token(token)?;
        let mut doc_types: Vec<DocType> = self
            .store()
            .documents_for_link(link.id)?
            .into_iter()
            .map(|d| d.doc_type)
            .collect();
        doc_types.sort();

        Ok(VendorLinkInfo {
            vendor_label: link.vendor_label,
            doc_types,
            expires_at: link.expires_at,
            encrypted_lsk_for_vendor: encode_b64(&link.encrypted_lsk_for_vendor),
            lsk_salt: encode_b64(&link.lsk_salt),
            lsk_nonce: encode_b64(&link.lsk_nonce),
        })
    }

    /// `POST /vendor/{token}/otp/send`. The claimed email must match the
    /// link's vendor email; a mismatch is audited under a fresh salt so
    /// denied attempts cannot be correlated with later challenges.
    pub fn vendor_otp_send(
        &self,
        token: &str,
        meta: &RequestMeta,
        req: OtpSendRequest,
    ) -> Result<OtpSendResponse, ApiError> {
        let link = self.active_link_by_token(token)?;

        if !hashing::emails_match(&req.email, &link.vendor_email) {
            self.deny_vendor(&link, meta, &req.email)?;
            return Err(ApiError::Forbidden);
        }

        let otp = hashing::generate_otp();
        let otp_salt = crypto::random_bytes::<16>();
        let email_salt = crypto::random_bytes::<16>();
        let vendor_email_hash = hashing::hash_email_with_salt(&email_salt, &req.email);

        let now = self.now();
        let challenge = OtpChallenge {
            id: Uuid::new_v4(),
            share_link_id: link.id,
            vendor_email_hash: vendor_email_hash.clone(),
            email_salt,
            otp_hash: hashing::otp_hash(&self.config.otp_secret, &otp, &otp_salt),
            otp_salt,
            attempts: 0,
            expires_at: now + self.config.otp_ttl_secs,
            created_at: now,
        };
        self.store().insert_otp_challenge(challenge.clone())?;

        if let Err(err) = self.mailer.send(OutboundMail::Otp {
            to: link.vendor_email.clone(),
            otp,
        }) {
            warn!(link_id = %link.id, %err, "otp mail not delivered");
        }

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                link.vault_id,
                ActorType::Vendor,
                vendor_email_hash,
                EventType::OtpSent,
            )
            .link(link.id),
        )?;

        Ok(OtpSendResponse {
            expires_at: challenge.expires_at,
        })
    }

    /// `POST /vendor/{token}/otp/verify`. Picks the newest unexpired
    /// challenge whose salted email hash matches the claimant (a resend
    /// supersedes the codes sent before it), enforces the attempt cap,
    /// compares in constant time, and mints the session cookie on success.
    pub fn vendor_otp_verify(
        &self,
        token: &str,
        meta: &RequestMeta,
        req: OtpVerifyRequest,
    ) -> Result<OtpVerifyResponse, ApiError> {
        let link = self.active_link_by_token(token)?;
        let now = self.now();

        // Resends stack challenges; the newest matching one is authoritative.
        let mut challenge = self
            .store()
            .otp_challenges_for_link(link.id)?
            .into_iter()
            .rev()
            .filter(|c| c.expires_at > now)
            .find(|c| {
                hashing::hash_email_with_salt(&c.email_salt, &req.email) == c.vendor_email_hash
            });

        let Some(challenge) = challenge.as_mut() else {
            self.deny_vendor(&link, meta, &req.email)?;
            return Err(ApiError::Unauthenticated);
        };

        if challenge.attempts >= MAX_OTP_ATTEMPTS {
            self.deny_vendor(&link, meta, &req.email)?;
            return Err(ApiError::Forbidden);
        }

        // Burn the attempt before looking at the OTP.
        challenge.attempts += 1;
        self.store().update_otp_challenge(challenge.clone())?;

        if !hashing::verify_otp(
            &self.config.otp_secret,
            &req.otp,
            &challenge.otp_salt,
            &challenge.otp_hash,
        ) {
            self.deny_vendor(&link, meta, &req.email)?;
            return Err(ApiError::Unauthenticated);
        }

        let expires_at = now + self.config.vendor_session_ttl_secs;
        let claims = VendorSessionClaims {
            share_link_id: link.id,
            vendor_email_hash: challenge.vendor_email_hash.clone(),
            user_agent_hash: session::user_agent_hash(
                &self.config.vendor_session_secret,
                meta.user_agent.as_deref().unwrap_or(""),
            ),
            expires_at,
        };
        let cookie_value = session::mint(&self.config.vendor_session_secret, &claims);

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                link.vault_id,
                ActorType::Vendor,
                challenge.vendor_email_hash.clone(),
                EventType::OtpVerified,
            )
            .link(link.id),
        )?;

        info!(link_id = %link.id, "vendor otp verified");
        Ok(OtpVerifyResponse {
            session: VendorSession {
                cookie_name: session::COOKIE_NAME,
                cookie_value,
                cookie_attributes: session::cookie_attributes(
                    self.config.secure_cookies,
                    self.config.vendor_session_ttl_secs,
                ),
                expires_at,
            },
        })
    }

    /// `GET /vendor/{token}/documents`.
    pub fn vendor_documents(
        &self,
        token: &str,
        cookie: &str,
        meta: &RequestMeta,
    ) -> Result<Vec<VendorDocumentEntry>, ApiError> {
        let link = self.active_link_by_token(token)?;
        let _claims = self.vendor_session(&link, cookie, meta)?;

        let mut entries = Vec::new();
        for link_doc in self.store().documents_for_link(link.id)? {
            let doc = self
                .store()
                .document_by_id(link_doc.document_id)?
                .ok_or(ApiError::Internal)?;
            entries.push(VendorDocumentEntry {
                document_id: doc.id,
                doc_type: doc.doc_type,
                filename: doc.filename,
                size: doc.size,
                storage_path: doc.storage_path,
                encrypted_dek_for_link: encode_b64(&link_doc.encrypted_dek_for_link),
                dek_for_link_nonce: encode_b64(&link_doc.dek_for_link_nonce),
            });
        }
        Ok(entries)
    }

    /// `GET /vendor/{token}/ciphertext-url?docId=`. Dispenses a short-lived
    /// signed GET from the blob adapter. URLs already minted survive a later
    /// revocation until their own expiry.
    pub fn vendor_ciphertext_url(
        &self,
        token: &str,
        cookie: &str,
        meta: &RequestMeta,
        doc_id: Uuid,
    ) -> Result<SignedUrlResponse, ApiError> {
        let link = self.active_link_by_token(token)?;
        let _claims = self.vendor_session(&link, cookie, meta)?;

        let shared = self
            .store()
            .documents_for_link(link.id)?
            .into_iter()
            .any(|d| d.document_id == doc_id);
        if !shared {
            return Err(ApiError::Forbidden);
        }

        let doc = self
            .store()
            .document_by_id(doc_id)?
            .ok_or(ApiError::NotFound)?;
        let signed =
            self.blobs
                .signed_get(&doc.storage_path, self.config.signed_url_ttl_secs, self.now())?;
        Ok(SignedUrlResponse {
            url: signed.url,
            expires_at: signed.expires_at,
        })
    }

    /// `POST /vendor/{token}/audit`. Accepts only reveal events carrying a
    /// strict UUIDv4 watermark reference.
    pub fn vendor_audit(
        &self,
        token: &str,
        cookie: &str,
        meta: &RequestMeta,
        req: VendorAuditRequest,
    ) -> Result<(), ApiError> {
        let link = self.active_link_by_token(token)?;
        let claims = self.vendor_session(&link, cookie, meta)?;

        if !req.event_type.is_reveal() {
            return Err(ApiError::validation("eventType", "not a reveal event"));
        }
        let reference = audit::parse_watermark_reference(&req.watermark_reference_id)
            .ok_or_else(|| {
                ApiError::validation("watermarkReferenceId", "must be a UUIDv4")
            })?;

        let covers_type = self
            .store()
            .documents_for_link(link.id)?
            .iter()
            .any(|d| d.doc_type == req.doc_type);
        if !covers_type {
            return Err(ApiError::validation("docType", "not shared by this link"));
        }

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                link.vault_id,
                ActorType::Vendor,
                claims.vendor_email_hash,
                req.event_type,
            )
            .link(link.id)
            .doc_type(req.doc_type)
            .watermark(reference),
        )?;
        Ok(())
    }

    /// Resolve a token to its link and enforce link state: unknown hash is
    /// 404, revoked or expired is 410.
    pub(crate) fn active_link_by_token(&self, token: &str) -> Result<ShareLink, ApiError> {
        let hash = hashing::token_hash(&self.config.token_hash_pepper, token);
        let link = self
            .store()
            .share_link_by_token_hash(&hash)?
            .ok_or(ApiError::NotFound)?;

        match link.status {
            ShareLinkStatus::Revoked => Err(ApiError::Gone),
            ShareLinkStatus::Pending => Err(ApiError::NotFound),
            ShareLinkStatus::Approved if link.expires_at <= self.now() => Err(ApiError::Gone),
            ShareLinkStatus::Approved => Ok(link),
        }
    }

    /// Validate the session cookie against this link. Failures are audited as
    /// denials before surfacing 401/403.
    fn vendor_session(
        &self,
        link: &ShareLink,
        cookie: &str,
        meta: &RequestMeta,
    ) -> Result<VendorSessionClaims, ApiError> {
        let claims = match session::validate(
            &self.config.vendor_session_secret,
            cookie,
            meta.user_agent.as_deref().unwrap_or(""),
            self.now(),
        ) {
            Ok(claims) => claims,
            Err(err) => {
                audit::record(
                    self.store(),
                    self.clock.as_ref(),
                    meta,
                    EventDraft::new(
                        link.vault_id,
                        ActorType::Vendor,
                        "unknown",
                        EventType::AccessDenied,
                    )
                    .link(link.id),
                )?;
                return Err(err.into());
            }
        };

        if claims.share_link_id != link.id {
            audit::record(
                self.store(),
                self.clock.as_ref(),
                meta,
                EventDraft::new(
                    link.vault_id,
                    ActorType::Vendor,
                    claims.vendor_email_hash,
                    EventType::AccessDenied,
                )
                .link(link.id),
            )?;
            return Err(ApiError::Forbidden);
        }
        Ok(claims)
    }

    /// Write an `access_denied` row for a failed vendor attempt. The actor is
    /// the claimed address hashed under a fresh per-attempt salt.
    fn deny_vendor(
        &self,
        link: &ShareLink,
        meta: &RequestMeta,
        claimed_email: &str,
    ) -> Result<(), ApiError> {
        let fresh_salt = crypto::random_bytes::<16>();
        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                link.vault_id,
                ActorType::Vendor,
                hashing::hash_email_with_salt(&fresh_salt, claimed_email),
                EventType::AccessDenied,
            )
            .link(link.id),
        )?;
        Ok(())
    }
}
