//! Logging initialization.
//!
//! Services emit `tracing` events; embedders call [`init`] once at startup.
//! Filtering follows `RUST_LOG`. Secrets, key material, and document
//! plaintext are never logged anywhere in this crate.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .try_init();
}
