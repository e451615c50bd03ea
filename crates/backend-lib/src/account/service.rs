// ============================
// crates/backend-lib/src/account/service.rs
// ============================
use std::sync::Arc;

use keyward_common::{
    ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest, ResetPasswordRequest,
    TokenPair, UserStatus, UserView,
};
use metrics::counter;
use uuid::Uuid;

use super::{Credential, CredentialStore, Mailer, DEFAULT_ROLE};
use crate::auth::TokenPurpose;
use crate::error::{AuthError, StoreError};
use crate::metrics as keys;
use crate::validation::{
    normalize_email, validate_email, validate_name, validate_new_password,
    validate_transient_token,
};
use crate::AuthCore;

const VERIFY_SUBJECT: &str = "Verify your email address";
const RESET_SUBJECT: &str = "Reset your password";

/// Registration, verification, login and password management
#[derive(Clone)]
pub struct AccountService {
    core: Arc<AuthCore>,
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
}

impl AccountService {
    pub fn new(core: Arc<AuthCore>, store: Arc<dyn CredentialStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { core, store, mailer }
    }

    pub fn core(&self) -> &Arc<AuthCore> {
        &self.core
    }

    /// Create an unverified account and mail its verification link
    pub async fn register(&self, req: RegisterRequest) -> Result<UserView, AuthError> {
        validate_email(req.email.trim())?;
        let name = validate_name(&req.name)?.to_string();
        validate_new_password(&req.password, &req.confirm_password, &self.core.password_requirements)?;

        let email = normalize_email(&req.email);
        if self.store.get_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash_password(req.password).await?;
        let token = self.core.transient.issue()?;
        let now = self.core.clock.now();

        let credential = Credential {
            id: Uuid::new_v4().to_string(),
            email,
            name,
            password_hash,
            status: UserStatus::Unverified,
            role: DEFAULT_ROLE.to_string(),
            verification_token: Some(token.clone()),
            verification_token_issued_at: Some(now),
            reset_token: None,
            reset_token_requested_at: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        self.store.create(credential.clone()).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::EmailTaken,
            other => other.into(),
        })?;
        counter!(keys::ACCOUNT_REGISTERED).increment(1);
        tracing::info!(user_id = %credential.id, "account registered");

        self.send_verification(&credential.email, &token).await?;
        Ok(credential.view())
    }

    /// Activate the account owning a verification token and consume the token
    pub async fn verify_email(&self, token: &str) -> Result<UserView, AuthError> {
        validate_transient_token(token)?;
        let credential = self
            .store
            .get_by_verification_token(token)
            .await?
            .ok_or(AuthError::InvalidTransientToken)?;

        let issued_at = credential
            .verification_token_issued_at
            .unwrap_or(credential.created_at);
        if self.core.transient.is_expired(TokenPurpose::EmailVerification, issued_at) {
            return Err(AuthError::TransientTokenExpired);
        }
        if credential.status.is_blocked() {
            return Err(AuthError::AccountDisabled);
        }

        let credential = self
            .store
            .consume_verification_token(token, self.core.clock.now())
            .await?
            .ok_or(AuthError::InvalidTransientToken)?;
        if credential.status.is_blocked() {
            return Err(AuthError::AccountDisabled);
        }

        tracing::info!(user_id = %credential.id, "email verified");
        Ok(credential.view())
    }

    /// Issue a fresh verification token, superseding the previous one
    ///
    /// Unknown or already verified addresses succeed silently.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(credential) = self.store.get_by_email(&email).await? else {
            tracing::debug!("verification resend for unknown email ignored");
            return Ok(());
        };
        if credential.status != UserStatus::Unverified {
            tracing::debug!(user_id = %credential.id, "verification resend for verified account ignored");
            return Ok(());
        }

        let token = self.core.transient.issue()?;
        self.store
            .set_verification_token(&credential.id, &token, self.core.clock.now())
            .await?;

        self.send_verification(&credential.email, &token).await
    }

    /// Exchange email and password for a token pair
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AuthError> {
        let email = normalize_email(&req.email);
        let Some(mut credential) = self.store.get_by_email(&email).await? else {
            // Unknown emails cost one KDF run, like a wrong password
            let decoy = self.core.decoy_hash().to_string();
            self.verify_password(req.password, decoy).await?;
            counter!(keys::LOGIN_FAILED).increment(1);
            tracing::debug!("login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .verify_password(req.password.clone(), credential.password_hash.clone())
            .await?
        {
            counter!(keys::LOGIN_FAILED).increment(1);
            tracing::warn!(user_id = %credential.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        if credential.status.is_blocked() {
            tracing::warn!(user_id = %credential.id, "login to blocked account");
            return Err(AuthError::AccountDisabled);
        }

        let tokens = self.core.signer.issue_access_refresh_pair(
            &credential.id,
            &credential.email,
            &credential.role,
        )?;

        let now = self.core.clock.now();
        self.store.record_login(&credential.id, now).await?;
        credential.last_login = Some(now);
        credential.updated_at = now;

        if self.core.hasher.needs_rehash(&credential.password_hash) {
            self.upgrade_hash(&credential.id, &credential.password_hash, req.password)
                .await;
        }

        counter!(keys::LOGIN_SUCCEEDED).increment(1);
        tracing::info!(user_id = %credential.id, "login succeeded");
        Ok(LoginResponse {
            tokens,
            user: credential.view(),
        })
    }

    /// Rotate a refresh token into a new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.core.signer.rotate(refresh_token)
    }

    /// Mail a password reset link; unknown addresses succeed silently
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(credential) = self.store.get_by_email(&email).await? else {
            tracing::debug!("password reset for unknown email ignored");
            return Ok(());
        };

        let token = self.core.transient.issue()?;
        self.store
            .set_reset_token(&credential.id, &token, self.core.clock.now())
            .await?;

        let link = self
            .core
            .transient
            .link_for(TokenPurpose::PasswordReset, &self.core.base_url, &token);
        let body = format!(
            "A password reset was requested for your account. Open the following link to choose a new password: {link}\n\nIf you did not request this, ignore this message."
        );
        self.mailer.send(&credential.email, RESET_SUBJECT, &body).await?;
        tracing::info!(user_id = %credential.id, "password reset requested");
        Ok(())
    }

    /// Set a new password with a reset token and consume the token
    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<(), AuthError> {
        validate_new_password(&req.new_password, &req.confirm_password, &self.core.password_requirements)?;
        validate_transient_token(&req.token)?;

        let credential = self
            .store
            .get_by_reset_token(&req.token)
            .await?
            .ok_or(AuthError::InvalidTransientToken)?;
        let requested_at = credential
            .reset_token_requested_at
            .ok_or(AuthError::InvalidTransientToken)?;
        if self.core.transient.is_expired(TokenPurpose::PasswordReset, requested_at) {
            return Err(AuthError::TransientTokenExpired);
        }

        let hash = self.hash_password(req.new_password).await?;
        if !self
            .store
            .consume_reset_token(&req.token, &hash, self.core.clock.now())
            .await?
        {
            tracing::warn!(user_id = %credential.id, "reset token consumed concurrently");
            return Err(AuthError::InvalidTransientToken);
        }

        counter!(keys::PASSWORD_RESET).increment(1);
        tracing::info!(user_id = %credential.id, "password reset");
        Ok(())
    }

    /// Change the password of a signed-in user
    pub async fn change_password(&self, user_id: &str, req: ChangePasswordRequest) -> Result<(), AuthError> {
        validate_new_password(&req.new_password, &req.confirm_password, &self.core.password_requirements)?;

        let credential = self
            .store
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("user".to_string()))?;

        if !self
            .verify_password(req.old_password, credential.password_hash.clone())
            .await?
        {
            tracing::warn!(user_id, "password change with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }

        let hash = self.hash_password(req.new_password).await?;
        let now = self.core.clock.now();
        if !self
            .store
            .replace_password_hash(&credential.id, &credential.password_hash, &hash, now)
            .await?
        {
            tracing::warn!(user_id, "password changed concurrently");
            return Err(AuthError::InvalidCredentials);
        }
        tracing::info!(user_id, "password changed");
        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserView, AuthError> {
        self.store
            .get_by_id(user_id)
            .await?
            .map(|c| c.view())
            .ok_or_else(|| AuthError::NotFound("user".to_string()))
    }

    async fn send_verification(&self, email: &str, token: &str) -> Result<(), AuthError> {
        let link = self
            .core
            .transient
            .link_for(TokenPurpose::EmailVerification, &self.core.base_url, token);
        let body = format!(
            "Thank you for registering. Verify your account by opening the following link: {link}"
        );
        self.mailer.send(email, VERIFY_SUBJECT, &body).await?;
        Ok(())
    }

    /// Rehash with current parameters unless the stored hash changed since `previous` was read
    async fn upgrade_hash(&self, user_id: &str, previous: &str, password: String) {
        let result = match self.hash_password(password).await {
            Ok(hash) => self
                .store
                .replace_password_hash(user_id, previous, &hash, self.core.clock.now())
                .await
                .map_err(AuthError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(true) => tracing::info!(user_id, "password hash upgraded"),
            Ok(false) => tracing::debug!(user_id, "password changed before rehash; keeping it"),
            Err(e) => tracing::warn!(user_id, error = %e, "password hash upgrade failed"),
        }
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.core.hasher.clone();
        tokio::task::spawn_blocking(move || {
            let mut password = password;
            hasher.hash_secure(&mut password)
        })
        .await
        .map_err(|e| AuthError::Crypto(format!("hashing task failed: {e}")))?
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AuthError> {
        let hasher = self.core.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Crypto(format!("verification task failed: {e}")))
    }
}
