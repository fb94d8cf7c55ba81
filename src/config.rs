//! Process configuration.
//!
//! Crypto peppers and secrets are read once at startup and held immutably for
//! the process lifetime; there is no re-read on signal. A missing required
//! key is fatal at start. Tests bypass the environment entirely via
//! [`Config::for_tests`].

use secrecy::SecretString;
use std::env;
use thiserror::Error;

pub const DEFAULT_OTP_TTL_SECS: u64 = 600;
pub const DEFAULT_VENDOR_SESSION_TTL_SECS: u64 = 1800;
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for environment variable {0}")]
    InvalidVar(&'static str),
}

pub struct Config {
    /// Process-wide pepper for link/invite token hashes.
    pub token_hash_pepper: SecretString,
    /// HMAC key for OTP hashing.
    pub otp_secret: SecretString,
    /// Salt for the address-book email equality helper.
    pub vendor_email_hash_salt: SecretString,
    /// HMAC key for vendor session cookie signing.
    pub vendor_session_secret: SecretString,
    pub otp_ttl_secs: u64,
    pub vendor_session_ttl_secs: u64,
    pub signed_url_ttl_secs: u64,
    /// Base for outbound link URLs, no trailing slash.
    pub app_url: String,
    pub storage_bucket: String,
    /// Mark session cookies `Secure` (production deployments).
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token_hash_pepper = require_secret("TOKEN_HASH_PEPPER")?;
        let otp_secret = first_secret(&["OTP_SECRET", "OTP_HMAC_SECRET"])
            .ok_or(ConfigError::MissingVar("OTP_SECRET"))?;
        let vendor_email_hash_salt = require_secret("VENDOR_EMAIL_HASH_SALT")?;
        let vendor_session_secret =
            first_secret(&["VENDOR_SESSION_SECRET", "OTP_SECRET", "SESSION_SECRET"])
                .ok_or(ConfigError::MissingVar("VENDOR_SESSION_SECRET"))?;

        Ok(Self {
            token_hash_pepper,
            otp_secret,
            vendor_email_hash_salt,
            vendor_session_secret,
            otp_ttl_secs: ttl("OTP_TTL_SECONDS", DEFAULT_OTP_TTL_SECS)?,
            vendor_session_ttl_secs: ttl(
                "VENDOR_SESSION_TTL_SECONDS",
                DEFAULT_VENDOR_SESSION_TTL_SECS,
            )?,
            signed_url_ttl_secs: ttl("SIGNED_URL_TTL_SECONDS", DEFAULT_SIGNED_URL_TTL_SECS)?,
            app_url: env::var("APP_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::MissingVar("APP_URL"))?,
            storage_bucket: env::var("STORAGE_BUCKET")
                .map_err(|_| ConfigError::MissingVar("STORAGE_BUCKET"))?,
            secure_cookies: env::var("APP_ENV").is_ok_and(|v| v == "production"),
        })
    }

    /// Fixed secrets and default TTLs, injected without touching the
    /// environment.
    pub fn for_tests() -> Self {
        Self {
            token_hash_pepper: SecretString::from("test-token-pepper"),
            otp_secret: SecretString::from("test-otp-secret"),
            vendor_email_hash_salt: SecretString::from("test-email-salt"),
            vendor_session_secret: SecretString::from("test-session-secret"),
            otp_ttl_secs: DEFAULT_OTP_TTL_SECS,
            vendor_session_ttl_secs: DEFAULT_VENDOR_SESSION_TTL_SECS,
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
            app_url: "https://vault.example.test".to_string(),
            storage_bucket: "test-bucket".to_string(),
            secure_cookies: false,
        }
    }
}

fn require_secret(key: &'static str) -> Result<SecretString, ConfigError> {
    env::var(key)
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingVar(key))
}

fn first_secret(keys: &[&'static str]) -> Option<SecretString> {
    keys.iter()
        .find_map(|key| env::var(key).ok())
        .map(SecretString::from)
}

fn ttl(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar(key)),
        Err(_) => Ok(default),
    }
}
