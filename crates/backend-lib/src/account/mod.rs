// ============================
// crates/backend-lib/src/account/mod.rs
// ============================
//! Account flows over the credential store and mailer collaborators.

mod service;

pub use service::AccountService;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_common::{UserStatus, UserView};

use crate::error::{MailError, StoreError};

/// Role given to self-registered accounts
pub const DEFAULT_ROLE: &str = "user";

/// A stored account with its credential material
#[derive(Clone)]
pub struct Credential {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub role: String,
    pub verification_token: Option<String>,
    pub verification_token_issued_at: Option<DateTime<Utc>>,
    pub reset_token: Option<String>,
    pub reset_token_requested_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Public projection, without hashes or tokens
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            status: self.status,
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("status", &self.status)
            .field("role", &self.role)
            .field("pending_verification", &self.verification_token.is_some())
            .field("pending_reset", &self.reset_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Persistence for credentials
///
/// Lookups return `Ok(None)` when nothing matches; errors are reserved for
/// the store itself failing.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Credential>, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError>;

    async fn get_by_verification_token(&self, token: &str) -> Result<Option<Credential>, StoreError>;

    async fn get_by_reset_token(&self, token: &str) -> Result<Option<Credential>, StoreError>;

    /// Insert a new credential; a taken email is a `Conflict`
    async fn create(&self, credential: Credential) -> Result<(), StoreError>;

    /// Replace every field of an existing credential
    ///
    /// Account flows only use the targeted writes below.
    async fn update(&self, credential: &Credential) -> Result<(), StoreError>;

    async fn update_password(&self, id: &str, password_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Swap the hash only if it still equals `previous`
    ///
    /// Returns false when the password changed in the meantime.
    async fn replace_password_hash(
        &self,
        id: &str,
        previous: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Set `last_login` (and `updated_at`) and nothing else
    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Store a verification token issued at `at`, superseding any previous one
    async fn set_verification_token(&self, id: &str, token: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Store a reset token requested at `at`, superseding any previous one
    async fn set_reset_token(&self, id: &str, token: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Atomically clear a verification token and activate its account
    ///
    /// Returns the updated credential, or `None` when no account holds the
    /// token. A blocked account keeps its status.
    async fn consume_verification_token(&self, token: &str, at: DateTime<Utc>) -> Result<Option<Credential>, StoreError>;

    /// Atomically clear a reset token and set the new hash
    ///
    /// Returns false when no account holds the token.
    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// Outgoing mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}
