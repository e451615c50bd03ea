// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Credential and token primitives.

pub mod api_key;
pub mod master_key;
pub mod password;
pub mod rate_limit;
pub mod rotation;
pub mod signer;
pub mod token_generator;
pub mod transient;

pub use api_key::{ApiKey, ApiKeyRegistry, KeyStatus};
pub use master_key::{MasterKey, MASTER_KEY_NAME};
pub use password::{validate_password_strength, PasswordHasher};
pub use rate_limit::{endpoint_id, RateLimiter};
pub use rotation::RotationLedger;
pub use signer::{AccessClaims, RefreshClaims, SigningSecret, TokenClaims, TokenSigner, TokenUse};
pub use token_generator::{generate_api_key, generate_secure_token, generate_secure_token_with_size};
pub use transient::{build_link, TokenPurpose, TransientTokenService};
