//! In-process implementation of the store seam.

use std::sync::RwLock;

use uuid::Uuid;

use crate::audit::AuditEvent;
use crate::model::{
    Document, OtpChallenge, ShareLink, ShareLinkDocument, ShareRequest, TeamInvite,
    TeamMembership, UserProfile, Vault,
};

use super::{Store, StoreError};

#[derive(Default)]
struct Tables {
    profiles: Vec<UserProfile>,
    vaults: Vec<Vault>,
    documents: Vec<Document>,
    share_requests: Vec<ShareRequest>,
    share_links: Vec<ShareLink>,
    share_link_documents: Vec<ShareLinkDocument>,
    memberships: Vec<TeamMembership>,
    invites: Vec<TeamInvite>,
    otp_challenges: Vec<OtpChallenge>,
    audit_events: Vec<AuditEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().expect("store lock poisoned")
    }
}

impl Store for MemoryStore {
    fn upsert_profile(&self, external_user_id: &str) -> Result<UserProfile, StoreError> {
        let mut t = self.write();
        if let Some(existing) = t
            .profiles
            .iter()
            .find(|p| p.external_user_id == external_user_id)
        {
            return Ok(existing.clone());
        }
        let profile = UserProfile {
            id: Uuid::new_v4(),
            external_user_id: external_user_id.to_string(),
        };
        t.profiles.push(profile.clone());
        Ok(profile)
    }

    fn profile_by_external_id(
        &self,
        external_user_id: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        Ok(self
            .read()
            .profiles
            .iter()
            .find(|p| p.external_user_id == external_user_id)
            .cloned())
    }

    fn profile_by_id(&self, id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.read().profiles.iter().find(|p| p.id == id).cloned())
    }

    fn insert_vault(&self, vault: Vault) -> Result<(), StoreError> {
        let mut t = self.write();
        if t.vaults
            .iter()
            .any(|v| v.owner_profile_id == vault.owner_profile_id)
        {
            return Err(StoreError::VaultExists);
        }
        t.vaults.push(vault);
        Ok(())
    }

    fn vault_by_id(&self, id: Uuid) -> Result<Option<Vault>, StoreError> {
        Ok(self.read().vaults.iter().find(|v| v.id == id).cloned())
    }

    fn vault_by_owner(&self, owner_profile_id: Uuid) -> Result<Option<Vault>, StoreError> {
        Ok(self
            .read()
            .vaults
            .iter()
            .find(|v| v.owner_profile_id == owner_profile_id)
            .cloned())
    }

    fn upsert_document(&self, doc: Document) -> Result<Option<Document>, StoreError> {
        let mut t = self.write();
        let predecessor = t
            .documents
            .iter()
            .position(|d| d.vault_id == doc.vault_id && d.doc_type == doc.doc_type);
        match predecessor {
            Some(idx) => {
                let prior = std::mem::replace(&mut t.documents[idx], doc);
                Ok(Some(prior))
            }
            None => {
                t.documents.push(doc);
                Ok(None)
            }
        }
    }

    fn document_by_id(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.read().documents.iter().find(|d| d.id == id).cloned())
    }

    fn documents_for_vault(&self, vault_id: Uuid) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .read()
            .documents
            .iter()
            .filter(|d| d.vault_id == vault_id)
            .cloned()
            .collect())
    }

    fn insert_share_request(&self, request: ShareRequest) -> Result<(), StoreError> {
        self.write().share_requests.push(request);
        Ok(())
    }

    fn share_request_by_id(&self, id: Uuid) -> Result<Option<ShareRequest>, StoreError> {
        Ok(self
            .read()
            .share_requests
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    fn share_requests_for_vault(&self, vault_id: Uuid) -> Result<Vec<ShareRequest>, StoreError> {
        Ok(self
            .read()
            .share_requests
            .iter()
            .filter(|r| r.vault_id == vault_id)
            .cloned()
            .collect())
    }

    fn update_share_request(&self, request: ShareRequest) -> Result<(), StoreError> {
        let mut t = self.write();
        let row = t
            .share_requests
            .iter_mut()
            .find(|r| r.id == request.id)
            .ok_or(StoreError::NotFound)?;
        *row = request;
        Ok(())
    }

    fn insert_share_link(&self, link: ShareLink) -> Result<(), StoreError> {
        let mut t = self.write();
        if t.share_links.iter().any(|l| l.token_hash == link.token_hash) {
            return Err(StoreError::TokenHashExists);
        }
        t.share_links.push(link);
        Ok(())
    }

    fn share_link_by_id(&self, id: Uuid) -> Result<Option<ShareLink>, StoreError> {
        Ok(self.read().share_links.iter().find(|l| l.id == id).cloned())
    }

    fn share_link_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ShareLink>, StoreError> {
        Ok(self
            .read()
            .share_links
            .iter()
            .find(|l| l.token_hash == token_hash)
            .cloned())
    }

    fn share_links_for_vault(&self, vault_id: Uuid) -> Result<Vec<ShareLink>, StoreError> {
        Ok(self
            .read()
            .share_links
            .iter()
            .filter(|l| l.vault_id == vault_id)
            .cloned()
            .collect())
    }

    fn update_share_link(&self, link: ShareLink) -> Result<(), StoreError> {
        let mut t = self.write();
        let row = t
            .share_links
            .iter_mut()
            .find(|l| l.id == link.id)
            .ok_or(StoreError::NotFound)?;
        *row = link;
        Ok(())
    }

    fn insert_share_link_document(&self, doc: ShareLinkDocument) -> Result<(), StoreError> {
        self.write().share_link_documents.push(doc);
        Ok(())
    }

    fn documents_for_link(&self, link_id: Uuid) -> Result<Vec<ShareLinkDocument>, StoreError> {
        Ok(self
            .read()
            .share_link_documents
            .iter()
            .filter(|d| d.share_link_id == link_id)
            .cloned()
            .collect())
    }

    fn insert_membership(&self, membership: TeamMembership) -> Result<(), StoreError> {
        self.write().memberships.push(membership);
        Ok(())
    }

    fn membership(
        &self,
        vault_id: Uuid,
        profile_id: Uuid,
    ) -> Result<Option<TeamMembership>, StoreError> {
        Ok(self
            .read()
            .memberships
            .iter()
            .find(|m| m.vault_id == vault_id && m.profile_id == profile_id)
            .cloned())
    }

    fn memberships_for_vault(&self, vault_id: Uuid) -> Result<Vec<TeamMembership>, StoreError> {
        Ok(self
            .read()
            .memberships
            .iter()
            .filter(|m| m.vault_id == vault_id)
            .cloned()
            .collect())
    }

    fn memberships_for_profile(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<TeamMembership>, StoreError> {
        Ok(self
            .read()
            .memberships
            .iter()
            .filter(|m| m.profile_id == profile_id)
            .cloned()
            .collect())
    }

    fn insert_invite(&self, invite: TeamInvite) -> Result<(), StoreError> {
        self.write().invites.push(invite);
        Ok(())
    }

    fn invite_by_token_hash(&self, token_hash: &str) -> Result<Option<TeamInvite>, StoreError> {
        Ok(self
            .read()
            .invites
            .iter()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    fn invites_for_vault(&self, vault_id: Uuid) -> Result<Vec<TeamInvite>, StoreError> {
        Ok(self
            .read()
            .invites
            .iter()
            .filter(|i| i.vault_id == vault_id)
            .cloned()
            .collect())
    }

    fn update_invite(&self, invite: TeamInvite) -> Result<(), StoreError> {
        let mut t = self.write();
        let row = t
            .invites
            .iter_mut()
            .find(|i| i.id == invite.id)
            .ok_or(StoreError::NotFound)?;
        *row = invite;
        Ok(())
    }

    fn insert_otp_challenge(&self, challenge: OtpChallenge) -> Result<(), StoreError> {
        self.write().otp_challenges.push(challenge);
        Ok(())
    }

    fn otp_challenges_for_link(&self, link_id: Uuid) -> Result<Vec<OtpChallenge>, StoreError> {
        Ok(self
            .read()
            .otp_challenges
            .iter()
            .filter(|c| c.share_link_id == link_id)
            .cloned()
            .collect())
    }

    fn update_otp_challenge(&self, challenge: OtpChallenge) -> Result<(), StoreError> {
        let mut t = self.write();
        let row = t
            .otp_challenges
            .iter_mut()
            .find(|c| c.id == challenge.id)
            .ok_or(StoreError::NotFound)?;
        *row = challenge;
        Ok(())
    }

    fn append_audit_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.write().audit_events.push(event);
        Ok(())
    }

    fn audit_events_for_vault(
        &self,
        vault_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        // Insertion order is the tie-break, so newest-first is a reverse scan.
        Ok(self
            .read()
            .audit_events
            .iter()
            .rev()
            .filter(|e| e.vault_id == vault_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
