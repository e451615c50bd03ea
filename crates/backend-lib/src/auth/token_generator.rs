// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
/** Secure random value generation
This module provides the OS-entropy backed random values behind
transient tokens, API keys and token identifiers. */
use rand::{rngs::OsRng, RngCore};

use crate::error::AuthError;

/// Default token size in bytes (32 bytes = 256 bits of entropy)
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Smallest accepted token size (128 bits)
pub const MIN_TOKEN_BYTES: usize = 16;

/** Generate a cryptographically secure random token
# Returns
64 lowercase hex characters, or an error if the OS entropy source fails */
pub fn generate_secure_token() -> Result<String, AuthError> {
    generate_secure_token_with_size(DEFAULT_TOKEN_BYTES)
}

/** Generate a cryptographically secure random token with specified size
# Arguments
* `bytes` - The size of the random token in bytes, at least 16
# Returns
A lowercase hex string of `2 * bytes` characters */
pub fn generate_secure_token_with_size(bytes: usize) -> Result<String, AuthError> {
    if bytes < MIN_TOKEN_BYTES {
        return Err(AuthError::Configuration(format!(
            "token size {bytes} is below the {MIN_TOKEN_BYTES} byte minimum"
        )));
    }
    let mut buffer = vec![0u8; bytes];
    OsRng.try_fill_bytes(&mut buffer).map_err(|e| {
        tracing::error!(error = %e, "OS entropy source failed");
        AuthError::Crypto(format!("entropy source failure: {e}"))
    })?;
    Ok(hex::encode(buffer))
}

/** Generate an opaque API key of the form `prefix_hexdigest` */
pub fn generate_api_key(prefix: &str) -> Result<String, AuthError> {
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AuthError::Validation(
            "API key prefix must be non-empty and alphanumeric".to_string(),
        ));
    }
    Ok(format!("{prefix}_{}", generate_secure_token()?))
}
