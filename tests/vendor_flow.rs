//! The vendor path end to end: OTP challenge, session, signed URLs,
//! client-side decryption, reveal audit, attempt caps, and revocation.

mod common;

use common::*;

use docvault::api::ApiError;
use docvault::audit::{ActorType, EventType};
use docvault::client::{owner::UnlockedVault, vendor};
use docvault::model::DocType;
use docvault::service::{
    ApproveShareRequest, AuthContext, CreateShareRequest, LinkDocumentKeyPayload,
    OtpSendRequest, OtpVerifyRequest, VendorAuditRequest,
};
use uuid::Uuid;

const VENDOR_EMAIL: &str = "v@example.test";
const WATERMARK: &str = "11111111-1111-4111-8111-111111111111";

struct SharedLink {
    vault_id: Uuid,
    token: String,
    vendor_secret: String,
    link_id: Uuid,
}

/// Owner-side setup: vault, one ID document ("ABC"), approved share.
fn approved_share(h: &Harness, ctx: &AuthContext) -> (UnlockedVault, SharedLink) {
    let (vault_id, vault) = init_vault(h, ctx);
    upload_document(h, ctx, &vault, DocType::Id, "id.png", b"ABC");

    let request = h
        .app
        .share_request_create(
            ctx,
            &meta(),
            CreateShareRequest {
                vault_id,
                vendor_label: "Acme Compliance".to_string(),
                vendor_email: Some(VENDOR_EMAIL.to_string()),
                purpose_notes: Some("KYC review".to_string()),
                requested_doc_types: vec![DocType::Id],
                expires_at: NOW + 7 * 86_400,
            },
        )
        .expect("request");

    let docs = h.app.documents_list(ctx).expect("documents");
    let artifacts = vault
        .build_approval_artifacts(&[(
            docs[0].id,
            unb64(docs[0].encrypted_dek_for_owner.as_ref().expect("wrap")),
        )])
        .expect("artifacts");

    let link = h
        .app
        .share_request_approve(
            ctx,
            &meta(),
            request.id,
            ApproveShareRequest {
                lsk_salt: b64(&artifacts.lsk_salt),
                lsk_nonce: b64(&artifacts.lsk_nonce),
                encrypted_lsk_for_vendor: b64(&artifacts.encrypted_lsk_for_vendor),
                encrypted_dek_for_link: artifacts
                    .document_keys
                    .iter()
                    .map(|k| LinkDocumentKeyPayload {
                        document_id: k.document_id,
                        encrypted_dek: b64(&k.encrypted_dek),
                        nonce: b64(&k.nonce),
                    })
                    .collect(),
                vendor_secret: artifacts.vendor_secret.to_dashed_string(),
            },
        )
        .expect("approve");

    let mail = h.mailer.last().expect("approval mail");
    let shared = SharedLink {
        vault_id,
        token: token_from_mail(&mail),
        vendor_secret: vendor_secret_from_mail(&mail),
        link_id: link.id,
    };
    (vault, shared)
}

/// OTP dance for the legitimate vendor; returns the session cookie.
fn vendor_session(h: &Harness, share: &SharedLink) -> String {
    h.app
        .vendor_otp_send(
            &share.token,
            &vendor_meta(),
            OtpSendRequest {
                email: VENDOR_EMAIL.to_string(),
            },
        )
        .expect("otp send");
    let otp = otp_from_mail(&h.mailer.last().expect("otp mail"));

    h.app
        .vendor_otp_verify(
            &share.token,
            &vendor_meta(),
            OtpVerifyRequest {
                email: VENDOR_EMAIL.to_string(),
                otp,
            },
        )
        .expect("otp verify")
        .session
        .cookie_value
}

#[test]
fn vendor_fetches_and_decrypts_the_shared_document() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);

    let info = h.app.vendor_link_info(&share.token).expect("link info");
    assert_eq!(info.doc_types, vec![DocType::Id]);

    // Claimed email is matched case-insensitively and trimmed.
    h.app
        .vendor_otp_send(
            &share.token,
            &vendor_meta(),
            OtpSendRequest {
                email: " V@Example.Test ".to_string(),
            },
        )
        .expect("otp send tolerant of case");
    let otp = otp_from_mail(&h.mailer.last().expect("otp mail"));
    let cookie = h
        .app
        .vendor_otp_verify(
            &share.token,
            &vendor_meta(),
            OtpVerifyRequest {
                email: VENDOR_EMAIL.to_string(),
                otp,
            },
        )
        .expect("verify")
        .session
        .cookie_value;

    let docs = h
        .app
        .vendor_documents(&share.token, &cookie, &vendor_meta())
        .expect("documents");
    assert_eq!(docs.len(), 1);

    let url = h
        .app
        .vendor_ciphertext_url(&share.token, &cookie, &vendor_meta(), docs[0].document_id)
        .expect("signed url");
    assert_eq!(url.expires_at, NOW + 300);

    // Vendor-side decryption: VS -> K_wrap -> LSK -> DEK -> plaintext.
    let blob = h.blobs.fetch_signed(&url.url, NOW).expect("fetch blob");
    let lsk = vendor::recover_lsk(
        &share.vendor_secret,
        &unb64(&info.lsk_salt),
        &unb64(&info.encrypted_lsk_for_vendor),
    )
    .expect("recover lsk");
    let plaintext =
        vendor::decrypt_document(&lsk, &unb64(&docs[0].encrypted_dek_for_link), &blob)
            .expect("decrypt");
    assert_eq!(plaintext.as_slice(), b"ABC");

    // Reveal audit with the client-generated watermark reference.
    h.app
        .vendor_audit(
            &share.token,
            &cookie,
            &vendor_meta(),
            VendorAuditRequest {
                event_type: EventType::DocViewed,
                doc_type: DocType::Id,
                watermark_reference_id: WATERMARK.to_string(),
            },
        )
        .expect("reveal audit");

    let events = h.app.audit_read(&ctx, share.vault_id, None).expect("audit");
    let otp_sent = events
        .iter()
        .find(|e| e.event_type == EventType::OtpSent)
        .expect("otp_sent");
    let otp_verified = events
        .iter()
        .find(|e| e.event_type == EventType::OtpVerified)
        .expect("otp_verified");
    let viewed = events
        .iter()
        .find(|e| e.event_type == EventType::DocViewed)
        .expect("doc_viewed");

    for event in [otp_sent, otp_verified, viewed] {
        assert_eq!(event.actor_type, ActorType::Vendor);
        assert_eq!(event.link_id, Some(share.link_id));
    }
    // All three acts belong to the same challenge-salted identity.
    assert_eq!(otp_sent.actor_id, otp_verified.actor_id);
    assert_eq!(otp_verified.actor_id, viewed.actor_id);
    assert_eq!(
        viewed.watermark_reference_id,
        Some(Uuid::try_parse(WATERMARK).unwrap())
    );
}

#[test]
fn claimed_email_mismatch_is_denied_and_audited() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);

    let err = h
        .app
        .vendor_otp_send(
            &share.token,
            &vendor_meta(),
            OtpSendRequest {
                email: "intruder@example.test".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));

    let events = h.app.audit_read(&ctx, share.vault_id, None).expect("audit");
    let denial = events
        .iter()
        .find(|e| e.event_type == EventType::AccessDenied)
        .expect("access_denied");
    assert_eq!(denial.actor_type, ActorType::Vendor);
    // Fresh-salt hash: not correlatable with any challenge identity.
    assert_eq!(denial.actor_id.len(), 64);
}

#[test]
fn otp_attempts_cap_at_five() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);

    h.app
        .vendor_otp_send(
            &share.token,
            &vendor_meta(),
            OtpSendRequest {
                email: VENDOR_EMAIL.to_string(),
            },
        )
        .expect("otp send");
    let otp = otp_from_mail(&h.mailer.last().expect("otp mail"));
    let wrong = if otp == "000000" { "000001" } else { "000000" };

    for _ in 0..5 {
        let err = h
            .app
            .vendor_otp_verify(
                &share.token,
                &vendor_meta(),
                OtpVerifyRequest {
                    email: VENDOR_EMAIL.to_string(),
                    otp: wrong.to_string(),
                },
            )
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    // Sixth attempt fails even with the right code.
    let err = h
        .app
        .vendor_otp_verify(
            &share.token,
            &vendor_meta(),
            OtpVerifyRequest {
                email: VENDOR_EMAIL.to_string(),
                otp,
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let events = h.app.audit_read(&ctx, share.vault_id, None).expect("audit");
    let denials = events
        .iter()
        .filter(|e| e.event_type == EventType::AccessDenied)
        .count();
    assert_eq!(denials, 6);
}

#[test]
fn a_resent_code_verifies_on_the_first_try() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);

    h.app
        .vendor_otp_send(
            &share.token,
            &vendor_meta(),
            OtpSendRequest {
                email: VENDOR_EMAIL.to_string(),
            },
        )
        .expect("first send");

    h.clock.advance(30);
    h.app
        .vendor_otp_send(
            &share.token,
            &vendor_meta(),
            OtpSendRequest {
                email: VENDOR_EMAIL.to_string(),
            },
        )
        .expect("resend");

    let otp_mails = h
        .mailer
        .sent()
        .into_iter()
        .filter(|m| matches!(m, docvault::mail::OutboundMail::Otp { .. }))
        .count();
    assert_eq!(otp_mails, 2);

    // Both challenges are still live; the code from the resend is the one
    // that must verify, without burning attempts on the stale challenge.
    let fresh = otp_from_mail(&h.mailer.last().expect("second otp mail"));
    h.app
        .vendor_otp_verify(
            &share.token,
            &vendor_meta(),
            OtpVerifyRequest {
                email: VENDOR_EMAIL.to_string(),
                otp: fresh,
            },
        )
        .expect("fresh code verifies");
}

#[test]
fn correct_otp_on_a_fresh_challenge_succeeds() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);
    let cookie = vendor_session(&h, &share);
    assert!(!cookie.is_empty());
}

#[test]
fn session_is_bound_to_the_user_agent() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);
    let cookie = vendor_session(&h, &share);

    // Same cookie, same user agent: fine.
    assert!(h
        .app
        .vendor_documents(&share.token, &cookie, &vendor_meta())
        .is_ok());

    // Same cookie, different user agent: rejected and audited.
    let mut stolen = vendor_meta();
    stolen.user_agent = Some("thief-agent/0.1".to_string());
    let err = h
        .app
        .vendor_documents(&share.token, &cookie, &stolen)
        .unwrap_err();
    assert_eq!(err.status_code(), 401);

    let events = h.app.audit_read(&ctx, share.vault_id, None).expect("audit");
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::AccessDenied));
}

#[test]
fn session_expires_with_the_clock() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);
    let cookie = vendor_session(&h, &share);

    h.clock.advance(1801);
    let err = h
        .app
        .vendor_documents(&share.token, &cookie, &vendor_meta())
        .unwrap_err();
    assert_eq!(err.status_code(), 401);
}

#[test]
fn revocation_closes_every_vendor_endpoint() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);
    let cookie = vendor_session(&h, &share);

    let docs = h
        .app
        .vendor_documents(&share.token, &cookie, &vendor_meta())
        .expect("documents");
    let url = h
        .app
        .vendor_ciphertext_url(&share.token, &cookie, &vendor_meta(), docs[0].document_id)
        .expect("signed url");

    h.app
        .link_revoke(&ctx, &meta(), share.link_id)
        .expect("revoke");

    assert_eq!(h.app.vendor_link_info(&share.token).unwrap_err().status_code(), 410);
    assert_eq!(
        h.app
            .vendor_otp_send(
                &share.token,
                &vendor_meta(),
                OtpSendRequest {
                    email: VENDOR_EMAIL.to_string()
                }
            )
            .unwrap_err()
            .status_code(),
        410
    );
    assert_eq!(
        h.app
            .vendor_otp_verify(
                &share.token,
                &vendor_meta(),
                OtpVerifyRequest {
                    email: VENDOR_EMAIL.to_string(),
                    otp: "123456".to_string()
                }
            )
            .unwrap_err()
            .status_code(),
        410
    );
    assert_eq!(
        h.app
            .vendor_documents(&share.token, &cookie, &vendor_meta())
            .unwrap_err()
            .status_code(),
        410
    );
    assert_eq!(
        h.app
            .vendor_ciphertext_url(&share.token, &cookie, &vendor_meta(), docs[0].document_id)
            .unwrap_err()
            .status_code(),
        410
    );
    assert_eq!(
        h.app
            .vendor_audit(
                &share.token,
                &cookie,
                &vendor_meta(),
                VendorAuditRequest {
                    event_type: EventType::DocViewed,
                    doc_type: DocType::Id,
                    watermark_reference_id: WATERMARK.to_string(),
                }
            )
            .unwrap_err()
            .status_code(),
        410
    );

    // A signed URL minted before revocation stays valid until its own expiry.
    assert!(h.blobs.fetch_signed(&url.url, NOW + 299).is_ok());
    assert!(h.blobs.fetch_signed(&url.url, NOW + 300).is_err());
}

#[test]
fn link_expiry_is_enforced_by_the_clock() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);

    h.clock.advance(8 * 86_400);
    assert_eq!(h.app.vendor_link_info(&share.token).unwrap_err().status_code(), 410);
}

#[test]
fn reveal_audit_demands_a_strict_uuidv4() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault, share) = approved_share(&h, &ctx);
    let cookie = vendor_session(&h, &share);

    for bad in [
        "not-a-uuid",
        "11111111-1111-1111-8111-111111111111", // wrong version
        "",
    ] {
        let err = h
            .app
            .vendor_audit(
                &share.token,
                &cookie,
                &vendor_meta(),
                VendorAuditRequest {
                    event_type: EventType::DocDownloaded,
                    doc_type: DocType::Id,
                    watermark_reference_id: bad.to_string(),
                },
            )
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    // Non-reveal event types are rejected outright.
    let err = h
        .app
        .vendor_audit(
            &share.token,
            &cookie,
            &vendor_meta(),
            VendorAuditRequest {
                event_type: EventType::OtpVerified,
                doc_type: DocType::Id,
                watermark_reference_id: WATERMARK.to_string(),
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[test]
fn unknown_token_is_not_found() {
    let h = harness();
    let ctx = owner_ctx();
    approved_share(&h, &ctx);

    let err = h.app.vendor_link_info("A".repeat(43).as_str()).unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
}
