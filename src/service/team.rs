//! Team membership and tokenized invites.
//!
//! Invites are bearer URLs: the token is emailed once, only its peppered hash
//! is stored, and acceptance requires the authenticated user's address to
//! match the invited one exactly.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ApiError;
use crate::audit::{self, ActorType, EventDraft, EventType, RequestMeta};
use crate::authz;
use crate::hashing;
use crate::mail::OutboundMail;
use crate::model::{DocType, Permissions, Role, TeamInvite, TeamMembership};

use super::{App, AuthContext};

/// Invites expire a week after creation.
const INVITE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCreateRequest {
    pub vault_id: Uuid,
    pub invited_email: String,
    pub allowed_doc_types: Vec<DocType>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCreateResponse {
    pub id: Uuid,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePreview {
    pub invited_email: String,
    pub role: Role,
    pub allowed_doc_types: Vec<DocType>,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub vault_id: Uuid,
    pub role: Role,
    pub allowed_doc_types: Vec<DocType>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEntry {
    pub profile_id: Uuid,
    pub role: Role,
    pub allowed_doc_types: Vec<DocType>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteEntry {
    pub id: Uuid,
    pub invited_email: String,
    pub role: Role,
    pub allowed_doc_types: Vec<DocType>,
    pub expires_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<u64>,
}

impl App {
    /// `POST /team/invites`. Owner only.
    pub fn invite_create(
        &self,
        ctx: &AuthContext,
        meta: &RequestMeta,
        req: InviteCreateRequest,
    ) -> Result<InviteCreateResponse, ApiError> {
        let (profile, _) = authz::require(
            self.store(),
            req.vault_id,
            &ctx.external_user_id,
            Some(Role::Owner),
        )?;

        let invited_email = req.invited_email.trim().to_string();
        if !invited_email.contains('@') {
            return Err(ApiError::validation("invitedEmail", "not an email address"));
        }
        let mut allowed = req.allowed_doc_types.clone();
        allowed.sort();
        allowed.dedup();
        if allowed.is_empty() {
            return Err(ApiError::validation("allowedDocTypes", "must not be empty"));
        }

        let token = hashing::generate_token();
        let now = self.now();
        let invite = TeamInvite {
            id: Uuid::new_v4(),
            vault_id: req.vault_id,
            invited_email: invited_email.clone(),
            role: Role::Delegate,
            permissions: Permissions {
                allowed_doc_types: allowed,
            },
            token_hash: hashing::token_hash(&self.config.token_hash_pepper, &token),
            expires_at: now + INVITE_TTL_SECS,
            created_at: now,
            accepted_at: None,
            accepted_by_profile_id: None,
        };
        self.store().insert_invite(invite.clone())?;

        if let Err(err) = self.mailer.send(OutboundMail::TeamInvite {
            to: invited_email,
            invite_url: format!("{}/invites/{token}", self.config.app_url),
        }) {
            warn!(invite_id = %invite.id, %err, "invite mail not delivered");
        }

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                req.vault_id,
                ActorType::Owner,
                profile.id.to_string(),
                EventType::InviteCreated,
            ),
        )?;

        Ok(InviteCreateResponse {
            id: invite.id,
            expires_at: invite.expires_at,
        })
    }

    /// `GET /team/invites/{token}/accept`: preview for the accept page.
    pub fn invite_get(&self, token: &str) -> Result<InvitePreview, ApiError> {
        let invite = self.invite_by_token(token)?;
        self.check_invite_open(&invite)?;

        Ok(InvitePreview {
            invited_email: invite.invited_email,
            role: invite.role,
            allowed_doc_types: invite.permissions.allowed_doc_types,
            expires_at: invite.expires_at,
        })
    }

    /// `POST /team/invites/{token}/accept`. Binds the authenticated identity
    /// to the vault at the invited role.
    pub fn invite_accept(
        &self,
        ctx: &AuthContext,
        meta: &RequestMeta,
        token: &str,
    ) -> Result<MembershipResponse, ApiError> {
        let mut invite = self.invite_by_token(token)?;
        self.check_invite_open(&invite)?;

        let caller_email = ctx.email.as_deref().ok_or(ApiError::Forbidden)?;
        if caller_email != invite.invited_email {
            return Err(ApiError::Forbidden);
        }

        let profile = self.store().upsert_profile(&ctx.external_user_id)?;
        let membership = TeamMembership {
            vault_id: invite.vault_id,
            profile_id: profile.id,
            role: invite.role,
            permissions: invite.permissions.clone(),
        };
        self.store().insert_membership(membership.clone())?;

        invite.accepted_at = Some(self.now());
        invite.accepted_by_profile_id = Some(profile.id);
        self.store().update_invite(invite.clone())?;

        audit::record(
            self.store(),
            self.clock.as_ref(),
            meta,
            EventDraft::new(
                invite.vault_id,
                ActorType::Delegate,
                profile.id.to_string(),
                EventType::InviteAccepted,
            ),
        )?;

        info!(vault_id = %invite.vault_id, "invite accepted");
        Ok(MembershipResponse {
            vault_id: membership.vault_id,
            role: membership.role,
            allowed_doc_types: membership.permissions.allowed_doc_types,
        })
    }

    /// `GET /team/members?vaultId=`: the implicit owner plus every delegate.
    pub fn members_list(
        &self,
        ctx: &AuthContext,
        vault_id: Uuid,
    ) -> Result<Vec<MemberEntry>, ApiError> {
        authz::require(self.store(), vault_id, &ctx.external_user_id, None)?;

        let vault = self
            .store()
            .vault_by_id(vault_id)?
            .ok_or(ApiError::NotFound)?;
        let mut members = vec![MemberEntry {
            profile_id: vault.owner_profile_id,
            role: Role::Owner,
            allowed_doc_types: DocType::ALL.to_vec(),
        }];
        for m in self.store().memberships_for_vault(vault_id)? {
            members.push(MemberEntry {
                profile_id: m.profile_id,
                role: m.role,
                allowed_doc_types: m.permissions.allowed_doc_types,
            });
        }
        Ok(members)
    }

    /// `GET /team/invites?vaultId=`. Owner only; token hashes stay internal.
    pub fn invites_list(
        &self,
        ctx: &AuthContext,
        vault_id: Uuid,
    ) -> Result<Vec<InviteEntry>, ApiError> {
        authz::require(self.store(), vault_id, &ctx.external_user_id, Some(Role::Owner))?;

        Ok(self
            .store()
            .invites_for_vault(vault_id)?
            .into_iter()
            .map(|i| InviteEntry {
                id: i.id,
                invited_email: i.invited_email,
                role: i.role,
                allowed_doc_types: i.permissions.allowed_doc_types,
                expires_at: i.expires_at,
                accepted_at: i.accepted_at,
            })
            .collect())
    }

    fn invite_by_token(&self, token: &str) -> Result<TeamInvite, ApiError> {
        let hash = hashing::token_hash(&self.config.token_hash_pepper, token);
        self.store()
            .invite_by_token_hash(&hash)?
            .ok_or(ApiError::NotFound)
    }

    fn check_invite_open(&self, invite: &TeamInvite) -> Result<(), ApiError> {
        if invite.accepted_at.is_some() {
            return Err(ApiError::validation("invite", "already accepted"));
        }
        if invite.expires_at <= self.now() {
            return Err(ApiError::Gone);
        }
        Ok(())
    }
}
