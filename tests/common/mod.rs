//! Shared harness: an [`App`] over in-process seams, plus the owner-side
//! setup every flow starts from.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::SecretString;

use docvault::audit::RequestMeta;
use docvault::blob::MemoryBlobStore;
use docvault::client::owner::{self, UnlockedVault};
use docvault::config::Config;
use docvault::crypto::KdfParams;
use docvault::mail::{MockMailer, OutboundMail};
use docvault::model::DocType;
use docvault::service::{
    App, AuthContext, CommitUploadRequest, CommitUploadResponse, VaultInitRequest,
};
use docvault::store::MemoryStore;
use docvault::time::FixedClock;

pub const NOW: u64 = 1_700_000_000;
pub const OWNER_PASSWORD: &str = "correcthorsebatterystaple";

pub struct Harness {
    pub app: App,
    pub blobs: Arc<MemoryBlobStore>,
    pub mailer: Arc<MockMailer>,
    pub clock: Arc<FixedClock>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new("test-bucket"));
    let mailer = Arc::new(MockMailer::new());
    let clock = Arc::new(FixedClock::new(NOW));
    let app = App::new(
        store,
        blobs.clone(),
        mailer.clone(),
        clock.clone(),
        Config::for_tests(),
    );
    Harness {
        app,
        blobs,
        mailer,
        clock,
    }
}

pub fn owner_ctx() -> AuthContext {
    AuthContext::with_email("idp|owner", "owner@example.test")
}

pub fn meta() -> RequestMeta {
    RequestMeta {
        user_agent: Some("owner-agent/1.0".to_string()),
        ip: Some("203.0.113.5".to_string()),
    }
}

pub fn vendor_meta() -> RequestMeta {
    RequestMeta {
        user_agent: Some("vendor-agent/7.2".to_string()),
        ip: Some("198.51.100.9".to_string()),
    }
}

pub fn b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn unb64(value: &str) -> Vec<u8> {
    BASE64.decode(value.as_bytes()).expect("valid base64")
}

/// Initialize the owner's vault and return the client-side unlocked session.
pub fn init_vault(h: &Harness, ctx: &AuthContext) -> (uuid::Uuid, UnlockedVault) {
    let kdf_salt: [u8; 16] = std::array::from_fn(|i| i as u8);
    let init = h
        .app
        .vault_init(
            ctx,
            VaultInitRequest {
                kdf_salt: b64(&kdf_salt),
                kdf_params: KdfParams::for_tests(),
            },
        )
        .expect("vault init");

    let status = h.app.vault_status(ctx).expect("vault status");
    let salt = unb64(&status.kdf_salt.expect("owner sees salt"));
    let vault = owner::unlock(
        &SecretString::from(OWNER_PASSWORD),
        &salt,
        status.kdf_params.expect("owner sees params"),
    )
    .expect("unlock");

    (init.id, vault)
}

/// Run the full three-phase upload for one document.
pub fn upload_document(
    h: &Harness,
    ctx: &AuthContext,
    vault: &UnlockedVault,
    doc_type: DocType,
    filename: &str,
    plaintext: &[u8],
) -> CommitUploadResponse {
    let enc = vault.encrypt_document(plaintext).expect("encrypt");

    let prep = h
        .app
        .prepare_upload(
            ctx,
            docvault::service::PrepareUploadRequest {
                doc_type,
                filename: filename.to_string(),
                size: plaintext.len() as u64,
            },
        )
        .expect("prepare");

    h.app
        .upload_ciphertext(ctx, &prep.storage_path, &enc.blob)
        .expect("put blob");

    h.app
        .commit_upload(
            ctx,
            &meta(),
            CommitUploadRequest {
                doc_id: prep.doc_id,
                doc_type,
                storage_path: prep.storage_path,
                filename: filename.to_string(),
                size: plaintext.len() as u64,
                ciphertext_checksum: enc.ciphertext_checksum,
                encrypted_dek_for_owner: b64(&enc.encrypted_dek_for_owner),
                dek_nonce: b64(&enc.dek_nonce),
            },
        )
        .expect("commit")
}

/// Invite and accept a delegate in one step, returning their auth context.
pub fn add_delegate(
    h: &Harness,
    owner: &AuthContext,
    vault_id: uuid::Uuid,
    external_user_id: &str,
    email: &str,
    allowed_doc_types: Vec<DocType>,
) -> AuthContext {
    h.app
        .invite_create(
            owner,
            &meta(),
            docvault::service::InviteCreateRequest {
                vault_id,
                invited_email: email.to_string(),
                allowed_doc_types,
            },
        )
        .expect("invite create");

    let invite_url = match h.mailer.last().expect("invite mail") {
        OutboundMail::TeamInvite { invite_url, .. } => invite_url,
        other => panic!("expected invite mail, got {other:?}"),
    };
    let token = invite_url
        .rsplit('/')
        .next()
        .expect("invite url has a token segment")
        .to_string();

    let delegate = AuthContext::with_email(external_user_id, email);
    h.app
        .invite_accept(&delegate, &meta(), &token)
        .expect("invite accept");
    delegate
}

/// Pull the bearer token out of an approval mail's link URL.
pub fn token_from_mail(mail: &OutboundMail) -> String {
    let OutboundMail::ShareApproval { link_url, .. } = mail else {
        panic!("expected approval mail, got {mail:?}");
    };
    link_url
        .rsplit('/')
        .next()
        .expect("link url has a token segment")
        .to_string()
}

pub fn vendor_secret_from_mail(mail: &OutboundMail) -> String {
    let OutboundMail::ShareApproval { vendor_secret, .. } = mail else {
        panic!("expected approval mail, got {mail:?}");
    };
    vendor_secret.clone()
}

pub fn otp_from_mail(mail: &OutboundMail) -> String {
    let OutboundMail::Otp { otp, .. } = mail else {
        panic!("expected otp mail, got {mail:?}");
    };
    otp.clone()
}
