//! Owner round-trip: initialize, upload, list, download, replace.

mod common;

use common::*;

use docvault::api::ApiError;
use docvault::blob::BlobStore;
use docvault::crypto::KdfParams;
use docvault::model::{DocType, Role};
use docvault::service::{AuthContext, VaultInitRequest};

#[test]
fn owner_uploads_and_decrypts_a_document() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault_id, vault) = init_vault(&h, &ctx);

    let commit = upload_document(&h, &ctx, &vault, DocType::Id, "id.png", b"ABC");
    assert!(!commit.replaced);

    let docs = h.app.documents_list(&ctx).expect("list");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].size, 3);
    assert_eq!(docs[0].doc_type, DocType::Id);

    let info = h
        .app
        .document_download_info(&ctx, docs[0].id)
        .expect("download info");
    let blob = h.app.document_ciphertext(&ctx, docs[0].id).expect("blob");

    let plaintext = vault
        .decrypt_document(&unb64(&info.encrypted_dek_for_owner), &blob)
        .expect("decrypt");
    assert_eq!(plaintext.as_slice(), b"ABC");
}

#[test]
fn replacing_a_document_supersedes_the_prior_blob() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault_id, vault) = init_vault(&h, &ctx);

    upload_document(&h, &ctx, &vault, DocType::Id, "id.png", b"ABC");
    let first = h.app.documents_list(&ctx).expect("list");
    let first_path = h
        .app
        .document_download_info(&ctx, first[0].id)
        .expect("info")
        .storage_path;

    let commit = upload_document(&h, &ctx, &vault, DocType::Id, "id-v2.png", b"DEF");
    assert!(commit.replaced);

    let docs = h.app.documents_list(&ctx).expect("list");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].size, 3);
    assert_eq!(docs[0].filename, "id-v2.png");

    let info = h
        .app
        .document_download_info(&ctx, docs[0].id)
        .expect("info");
    let blob = h.app.document_ciphertext(&ctx, docs[0].id).expect("blob");
    let plaintext = vault
        .decrypt_document(&unb64(&info.encrypted_dek_for_owner), &blob)
        .expect("decrypt");
    assert_eq!(plaintext.as_slice(), b"DEF");

    // The superseded ciphertext is gone from the blob store.
    assert!(h.blobs.get(&first_path).is_err());
}

#[test]
fn vault_init_is_rejected_for_an_existing_owner() {
    let h = harness();
    let ctx = owner_ctx();
    init_vault(&h, &ctx);

    let err = h
        .app
        .vault_init(
            &ctx,
            VaultInitRequest {
                kdf_salt: b64(&[9u8; 16]),
                kdf_params: KdfParams::for_tests(),
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[test]
fn status_is_not_found_without_a_vault() {
    let h = harness();
    let err = h
        .app
        .vault_status(&AuthContext::new("idp|nobody"))
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
}

#[test]
fn commit_with_a_wrong_checksum_is_rejected() {
    let h = harness();
    let ctx = owner_ctx();
    let (_vault_id, vault) = init_vault(&h, &ctx);

    let enc = vault.encrypt_document(b"ABC").expect("encrypt");
    let prep = h
        .app
        .prepare_upload(
            &ctx,
            docvault::service::PrepareUploadRequest {
                doc_type: DocType::Id,
                filename: "id.png".to_string(),
                size: 3,
            },
        )
        .expect("prepare");
    h.app
        .upload_ciphertext(&ctx, &prep.storage_path, &enc.blob)
        .expect("put");

    let err = h
        .app
        .commit_upload(
            &ctx,
            &meta(),
            docvault::service::CommitUploadRequest {
                doc_id: prep.doc_id,
                doc_type: DocType::Id,
                storage_path: prep.storage_path,
                filename: "id.png".to_string(),
                size: 3,
                ciphertext_checksum: "0".repeat(64),
                encrypted_dek_for_owner: b64(&enc.encrypted_dek_for_owner),
                dek_nonce: b64(&enc.dek_nonce),
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    // Nothing was committed; the client retries the whole upload.
    assert!(h.app.documents_list(&ctx).expect("list").is_empty());
}

#[test]
fn status_reports_roles_and_unlock_material() {
    let h = harness();
    let ctx = owner_ctx();
    init_vault(&h, &ctx);

    let status = h.app.vault_status(&ctx).expect("status");
    assert_eq!(status.role, Role::Owner);
    assert_eq!(unb64(&status.kdf_salt.expect("salt")).len(), 16);

    h.app
        .vault_unlocked(&ctx, &meta())
        .expect("unlock audit accepted");
}

#[test]
fn recommended_kdf_parameters_are_the_vault_defaults() {
    let params = KdfParams::recommended();
    assert_eq!(params.memory_kib, 65536);
    assert_eq!(params.time_cost, 12);
    assert_eq!(params.parallelism, 4);
}
