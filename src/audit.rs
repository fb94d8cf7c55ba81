//! Append-only audit log: typed events, capped newest-first reads.
//!
//! Every state transition and every denial writes here. There are no mutation
//! or deletion paths; `created_at` is monotonic per vault only to within
//! timestamp resolution, with ties broken by insertion order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::DocType;
use crate::store::{Store, StoreError};
use crate::time::Clock;

/// Default read cap when the caller supplies none.
pub const DEFAULT_READ_CAP: usize = 100;
/// Hard per-call read cap.
pub const MAX_READ_CAP: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Owner,
    Delegate,
    Vendor,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    VaultUnlocked,
    DocumentUploaded,
    ShareRequestCreated,
    ShareRequestApproved,
    ShareRequestRejected,
    LinkCreated,
    LinkRevoked,
    InviteCreated,
    InviteAccepted,
    OtpSent,
    OtpVerified,
    AccessDenied,
    DocViewed,
    DocDownloaded,
}

impl EventType {
    /// Reveal events must carry a watermark reference id.
    pub fn is_reveal(self) -> bool {
        matches!(self, EventType::DocViewed | EventType::DocDownloaded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub actor_type: ActorType,
    /// Profile id (owner/delegate) or salted email hash (vendor).
    pub actor_id: String,
    pub event_type: EventType,
    pub link_id: Option<Uuid>,
    pub doc_type: Option<DocType>,
    pub watermark_reference_id: Option<Uuid>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub created_at: u64,
}

/// Request metadata captured from transport headers and attached to every
/// event written on that request's behalf.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// An event before request metadata and timestamps are attached.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub vault_id: Uuid,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub event_type: EventType,
    pub link_id: Option<Uuid>,
    pub doc_type: Option<DocType>,
    pub watermark_reference_id: Option<Uuid>,
}

impl EventDraft {
    pub fn new(
        vault_id: Uuid,
        actor_type: ActorType,
        actor_id: impl Into<String>,
        event_type: EventType,
    ) -> Self {
        Self {
            vault_id,
            actor_type,
            actor_id: actor_id.into(),
            event_type,
            link_id: None,
            doc_type: None,
            watermark_reference_id: None,
        }
    }

    pub fn link(mut self, link_id: Uuid) -> Self {
        self.link_id = Some(link_id);
        self
    }

    pub fn doc_type(mut self, doc_type: DocType) -> Self {
        self.doc_type = Some(doc_type);
        self
    }

    pub fn watermark(mut self, reference_id: Uuid) -> Self {
        self.watermark_reference_id = Some(reference_id);
        self
    }
}

/// Append one event. Audit failures are surfaced to the caller: an operation
/// that cannot be audited must not silently succeed.
pub fn record(
    store: &dyn Store,
    clock: &dyn Clock,
    meta: &RequestMeta,
    draft: EventDraft,
) -> Result<(), StoreError> {
    store.append_audit_event(AuditEvent {
        id: Uuid::new_v4(),
        vault_id: draft.vault_id,
        actor_type: draft.actor_type,
        actor_id: draft.actor_id,
        event_type: draft.event_type,
        link_id: draft.link_id,
        doc_type: draft.doc_type,
        watermark_reference_id: draft.watermark_reference_id,
        user_agent: meta.user_agent.clone(),
        ip: meta.ip.clone(),
        created_at: clock.now_unix(),
    })
}

/// Vault-scoped newest-first read with the per-call cap applied.
pub fn read_events(
    store: &dyn Store,
    vault_id: Uuid,
    limit: Option<usize>,
) -> Result<Vec<AuditEvent>, StoreError> {
    let cap = limit.unwrap_or(DEFAULT_READ_CAP).min(MAX_READ_CAP);
    store.audit_events_for_vault(vault_id, cap)
}

/// Strict watermark reference check: version-4, RFC 4122 variant.
pub fn parse_watermark_reference(input: &str) -> Option<Uuid> {
    let id = Uuid::try_parse(input).ok()?;
    if id.get_version_num() == 4 && id.get_variant() == uuid::Variant::RFC4122 {
        Some(id)
    } else {
        None
    }
}
