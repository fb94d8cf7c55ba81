//! Invites and membership: token lifecycle, email binding, expiry, and the
//! resulting delegate permissions.

mod common;

use common::*;

use docvault::api::ApiError;
use docvault::audit::EventType;
use docvault::mail::OutboundMail;
use docvault::model::{DocType, Role};
use docvault::service::{AuthContext, InviteCreateRequest};

fn invite_token(h: &Harness) -> String {
    match h.mailer.last().expect("invite mail") {
        OutboundMail::TeamInvite { invite_url, .. } => invite_url
            .rsplit('/')
            .next()
            .expect("token segment")
            .to_string(),
        other => panic!("expected invite mail, got {other:?}"),
    }
}

#[test]
fn invite_binds_a_delegate_with_granted_doc_types() {
    let h = harness();
    let ctx = owner_ctx();
    let (vault_id, _vault) = init_vault(&h, &ctx);

    let delegate = add_delegate(
        &h,
        &ctx,
        vault_id,
        "idp|delegate",
        "d@example.test",
        vec![DocType::Id, DocType::ProofOfAddress],
    );

    let status = h.app.vault_status(&delegate).expect("status");
    assert_eq!(status.role, Role::Delegate);
    // Delegates never receive unlock material.
    assert!(status.kdf_salt.is_none());
    assert!(status.kdf_params.is_none());

    let members = h.app.members_list(&ctx, vault_id).expect("members");
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].role, Role::Owner);
    assert_eq!(
        members[1].allowed_doc_types,
        vec![DocType::Id, DocType::ProofOfAddress]
    );

    let events = h.app.audit_read(&ctx, vault_id, None).expect("audit");
    assert!(events.iter().any(|e| e.event_type == EventType::InviteCreated));
    assert!(events.iter().any(|e| e.event_type == EventType::InviteAccepted));
}

#[test]
fn only_owners_create_invites() {
    let h = harness();
    let ctx = owner_ctx();
    let (vault_id, _vault) = init_vault(&h, &ctx);
    let delegate = add_delegate(
        &h,
        &ctx,
        vault_id,
        "idp|delegate",
        "d@example.test",
        vec![DocType::Id],
    );

    let err = h
        .app
        .invite_create(
            &delegate,
            &meta(),
            InviteCreateRequest {
                vault_id,
                invited_email: "other@example.test".to_string(),
                allowed_doc_types: vec![DocType::Id],
            },
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));
}

#[test]
fn acceptance_requires_the_invited_address() {
    let h = harness();
    let ctx = owner_ctx();
    let (vault_id, _vault) = init_vault(&h, &ctx);

    h.app
        .invite_create(
            &ctx,
            &meta(),
            InviteCreateRequest {
                vault_id,
                invited_email: "d@example.test".to_string(),
                allowed_doc_types: vec![DocType::Id],
            },
        )
        .expect("invite");
    let token = invite_token(&h);

    let wrong_email = AuthContext::with_email("idp|imposter", "imposter@example.test");
    let err = h.app.invite_accept(&wrong_email, &meta(), &token).unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));

    let no_email = AuthContext::new("idp|anon");
    let err = h.app.invite_accept(&no_email, &meta(), &token).unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));

    let invited = AuthContext::with_email("idp|delegate", "d@example.test");
    let membership = h.app.invite_accept(&invited, &meta(), &token).expect("accept");
    assert_eq!(membership.vault_id, vault_id);
    assert_eq!(membership.role, Role::Delegate);
}

#[test]
fn an_invite_accepts_exactly_once() {
    let h = harness();
    let ctx = owner_ctx();
    let (vault_id, _vault) = init_vault(&h, &ctx);

    h.app
        .invite_create(
            &ctx,
            &meta(),
            InviteCreateRequest {
                vault_id,
                invited_email: "d@example.test".to_string(),
                allowed_doc_types: vec![DocType::Id],
            },
        )
        .expect("invite");
    let token = invite_token(&h);

    let invited = AuthContext::with_email("idp|delegate", "d@example.test");
    h.app.invite_accept(&invited, &meta(), &token).expect("accept");

    let err = h.app.invite_accept(&invited, &meta(), &token).unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[test]
fn invites_expire_after_seven_days() {
    let h = harness();
    let ctx = owner_ctx();
    let (vault_id, _vault) = init_vault(&h, &ctx);

    h.app
        .invite_create(
            &ctx,
            &meta(),
            InviteCreateRequest {
                vault_id,
                invited_email: "d@example.test".to_string(),
                allowed_doc_types: vec![DocType::Id],
            },
        )
        .expect("invite");
    let token = invite_token(&h);

    let preview = h.app.invite_get(&token).expect("preview");
    assert_eq!(preview.invited_email, "d@example.test");

    h.clock.advance(7 * 86_400 + 1);

    assert!(matches!(h.app.invite_get(&token).unwrap_err(), ApiError::Gone));
    let invited = AuthContext::with_email("idp|delegate", "d@example.test");
    let err = h.app.invite_accept(&invited, &meta(), &token).unwrap_err();
    assert!(matches!(err, ApiError::Gone));
}

#[test]
fn owners_list_invites_without_token_material() {
    let h = harness();
    let ctx = owner_ctx();
    let (vault_id, _vault) = init_vault(&h, &ctx);
    add_delegate(
        &h,
        &ctx,
        vault_id,
        "idp|delegate",
        "d@example.test",
        vec![DocType::Id],
    );

    let invites = h.app.invites_list(&ctx, vault_id).expect("invites");
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].invited_email, "d@example.test");
    assert!(invites[0].accepted_at.is_some());

    let rendered = serde_json::to_string(&invites).expect("serialize");
    assert!(!rendered.contains("tokenHash"));
}

#[test]
fn unknown_invite_token_is_not_found() {
    let h = harness();
    let err = h.app.invite_get("no-such-token").unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
}

#[test]
fn audit_read_is_capped_and_scoped() {
    let h = harness();
    let ctx = owner_ctx();
    let (vault_id, vault) = init_vault(&h, &ctx);

    for i in 0..4 {
        upload_document(
            &h,
            &ctx,
            &vault,
            DocType::Id,
            &format!("id-{i}.png"),
            b"ABC",
        );
    }

    let all = h.app.audit_read(&ctx, vault_id, None).expect("audit");
    assert_eq!(all.len(), 4);
    let capped = h.app.audit_read(&ctx, vault_id, Some(2)).expect("audit");
    assert_eq!(capped.len(), 2);

    // A stranger cannot read the log at all.
    let err = h
        .app
        .audit_read(&AuthContext::new("idp|stranger"), vault_id, None)
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));
}
