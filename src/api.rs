//! The error taxonomy the endpoint surface speaks.
//!
//! Every service method returns `Result<T, ApiError>`; the transport adapter
//! maps the variant to an HTTP status via [`ApiError::status_code`]. Handlers
//! never expose backend exception text, and crypto failures are always
//! indistinguishable from a wrong key.

use serde::Serialize;
use thiserror::Error;

use crate::blob::BlobError;
use crate::crypto::CryptoError;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::vendor_secret::VendorSecretError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("gone")]
    Gone,

    #[error("temporarily unavailable")]
    Transient,

    #[error("internal error")]
    Internal,
}

impl ApiError {
    /// Single-field validation failure.
    pub fn validation(field: &str, message: &str) -> Self {
        ApiError::Validation(vec![FieldError {
            field: field.to_string(),
            message: message.to_string(),
        }])
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Unauthenticated => 401,
            ApiError::Forbidden => 403,
            ApiError::NotFound => 404,
            ApiError::Gone => 410,
            ApiError::Transient => 503,
            ApiError::Internal => 500,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Unavailable => ApiError::Transient,
            StoreError::VaultExists => ApiError::validation("vault", "vault already exists"),
            // A 256-bit hash collision is not a client problem.
            StoreError::TokenHashExists => ApiError::Internal,
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) => ApiError::NotFound,
            BlobError::AlreadyExists(_) | BlobError::InvalidPath => {
                ApiError::validation("storagePath", "invalid storage path")
            }
            BlobError::BadSignedUrl | BlobError::SignedUrlExpired => ApiError::Forbidden,
            BlobError::Io(_) => ApiError::Transient,
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(_: CryptoError) -> Self {
        // Structural detail stays server-side; the payload is simply invalid.
        ApiError::validation("payload", "invalid cryptographic payload")
    }
}

impl From<VendorSecretError> for ApiError {
    fn from(err: VendorSecretError) -> Self {
        match err {
            VendorSecretError::BadFormat => {
                ApiError::validation("vendorSecret", "malformed vendor secret")
            }
            VendorSecretError::BadChecksum => {
                ApiError::validation("vendorSecret", "vendor secret checksum mismatch")
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(_: SessionError) -> Self {
        ApiError::Unauthenticated
    }
}
