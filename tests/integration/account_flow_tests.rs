// ======================================
// tests/integration/account_flow_tests.rs
// ======================================
//! End-to-end account lifecycle through `AccountService`
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use keyward_common::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, UserStatus,
};
use keyward_lib::account::{Credential, CredentialStore};
use keyward_lib::error::{AuthError, ErrorKind, StoreError};
use keyward_lib::storage::MemoryCredentialStore;
use keyward_lib::{AppState, AuthCore};

use crate::test_utils::{setup_test_env, setup_test_env_with, test_settings, TestEnv};

const EMAIL: &str = "ada@example.com";
const PASSWORD: &str = "secret123";

fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        name: "Ada Lovelace".to_string(),
        password: PASSWORD.to_string(),
        confirm_password: PASSWORD.to_string(),
    }
}

fn login_request(password: &str) -> LoginRequest {
    LoginRequest {
        email: EMAIL.to_string(),
        password: password.to_string(),
    }
}

async fn registered(env: &TestEnv) -> String {
    env.state.accounts.register(register_request(EMAIL)).await.unwrap();
    env.mailer.last_token().expect("verification token mailed")
}

async fn block(env: &TestEnv, email: &str) {
    let mut credential = env.store.get_by_email(email).await.unwrap().unwrap();
    credential.status = UserStatus::Blocked;
    env.store.update(&credential).await.unwrap();
}

#[tokio::test]
async fn test_register_verify_and_token_is_single_use() {
    let env = setup_test_env();
    let user = env.state.accounts.register(register_request(" Ada@Example.com ")).await.unwrap();
    assert_eq!(user.email, EMAIL);
    assert_eq!(user.status, UserStatus::Unverified);

    let mail = env.mailer.last().unwrap();
    assert_eq!(mail.to, EMAIL);
    assert!(mail.body.contains("https://keyward.test/auth/verify-email?token="));
    let token = mail.token().unwrap();

    let verified = env.state.accounts.verify_email(&token).await.unwrap();
    assert_eq!(verified.status, UserStatus::Active);

    let err = env.state.accounts.verify_email(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidTransientToken));
}

#[tokio::test]
async fn test_verification_token_expires() {
    let env = setup_test_env();
    let token = registered(&env).await;

    env.clock.advance(Duration::hours(24) + Duration::seconds(1));
    let err = env.state.accounts.verify_email(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::TransientTokenExpired));
    assert_eq!(err.kind(), ErrorKind::ExpiredToken);
}

#[tokio::test]
async fn test_resend_supersedes_previous_token() {
    let env = setup_test_env();
    let first = registered(&env).await;

    env.state.accounts.resend_verification(EMAIL).await.unwrap();
    let second = env.mailer.last_token().unwrap();
    assert_ne!(first, second);

    assert!(matches!(
        env.state.accounts.verify_email(&first).await.unwrap_err(),
        AuthError::InvalidTransientToken
    ));
    env.state.accounts.verify_email(&second).await.unwrap();

    // Verified and unknown addresses are accepted without sending anything
    let sent = env.mailer.sent().len();
    env.state.accounts.resend_verification(EMAIL).await.unwrap();
    env.state.accounts.resend_verification("nobody@example.com").await.unwrap();
    assert_eq!(env.mailer.sent().len(), sent);
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let env = setup_test_env();
    registered(&env).await;

    let err = env.state.accounts.register(register_request("ADA@example.com")).await.unwrap_err();
    assert!(matches!(err, AuthError::EmailTaken));

    let mut req = register_request("bob@example.com");
    req.confirm_password = "secret124".to_string();
    let err = env.state.accounts.register(req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    let err = env.state.accounts.register(register_request("not-an-email")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    assert_eq!(env.store.len().await, 1);
}

#[tokio::test]
async fn test_login_issues_distinct_pairs() {
    let env = setup_test_env();
    registered(&env).await;

    let err = env.state.accounts.login(login_request("wrong-password")).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    let err = env
        .state
        .accounts
        .login(LoginRequest {
            email: "nobody@example.com".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let first = env.state.accounts.login(login_request(PASSWORD)).await.unwrap();
    let second = env.state.accounts.login(login_request(PASSWORD)).await.unwrap();
    assert_ne!(first.tokens.access_token, second.tokens.access_token);
    assert_ne!(first.tokens.refresh_token, second.tokens.refresh_token);
    assert!(second.user.last_login.is_some());

    let signer = &env.state.core.signer;
    for pair in [&first.tokens, &second.tokens] {
        let claims = signer.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, first.user.id);
        assert_eq!(claims.email, EMAIL);
        assert_eq!(claims.role, "user");
    }
}

#[tokio::test]
async fn test_blocked_account() {
    let env = setup_test_env();
    let token = registered(&env).await;
    block(&env, EMAIL).await;

    let err = env.state.accounts.login(login_request(PASSWORD)).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));
    assert_eq!(err.kind(), ErrorKind::RevokedOrDisabled);

    // A wrong password never reveals the account state
    let err = env.state.accounts.login(login_request("wrong-password")).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let err = env.state.accounts.verify_email(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));
}

#[tokio::test]
async fn test_password_reset_flow() {
    let env = setup_test_env();
    registered(&env).await;

    env.state.accounts.forgot_password(EMAIL).await.unwrap();
    let mail = env.mailer.last().unwrap();
    assert!(mail.body.contains("https://keyward.test/reset-password?token="));
    let token = mail.token().unwrap();

    let reset = ResetPasswordRequest {
        token: token.clone(),
        new_password: "brand-new-pass".to_string(),
        confirm_password: "brand-new-pass".to_string(),
    };
    env.state.accounts.reset_password(reset.clone()).await.unwrap();

    assert!(env.state.accounts.login(login_request(PASSWORD)).await.is_err());
    env.state.accounts.login(login_request("brand-new-pass")).await.unwrap();

    let err = env.state.accounts.reset_password(reset).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidTransientToken));
}

#[tokio::test]
async fn test_password_reset_token_expires() {
    let env = setup_test_env();
    registered(&env).await;
    env.state.accounts.forgot_password(EMAIL).await.unwrap();
    let token = env.mailer.last_token().unwrap();

    env.clock.advance(Duration::hours(1) + Duration::seconds(1));
    let err = env
        .state
        .accounts
        .reset_password(ResetPasswordRequest {
            token,
            new_password: "brand-new-pass".to_string(),
            confirm_password: "brand-new-pass".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TransientTokenExpired));
    env.state.accounts.login(login_request(PASSWORD)).await.unwrap();
}

#[tokio::test]
async fn test_forgot_password_for_unknown_email_is_silent() {
    let env = setup_test_env();
    env.state.accounts.forgot_password("nobody@example.com").await.unwrap();
    assert!(env.mailer.sent().is_empty());

    let err = env
        .state
        .accounts
        .reset_password(ResetPasswordRequest {
            token: "0".repeat(64),
            new_password: "brand-new-pass".to_string(),
            confirm_password: "brand-new-pass".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidTransientToken));
}

#[tokio::test]
async fn test_change_password() {
    let env = setup_test_env();
    registered(&env).await;
    let user = env.state.accounts.login(login_request(PASSWORD)).await.unwrap().user;

    let err = env
        .state
        .accounts
        .change_password(
            &user.id,
            ChangePasswordRequest {
                old_password: "wrong-password".to_string(),
                new_password: "changed-pass".to_string(),
                confirm_password: "changed-pass".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    env.state
        .accounts
        .change_password(
            &user.id,
            ChangePasswordRequest {
                old_password: PASSWORD.to_string(),
                new_password: "changed-pass".to_string(),
                confirm_password: "changed-pass".to_string(),
            },
        )
        .await
        .unwrap();
    env.state.accounts.login(login_request("changed-pass")).await.unwrap();

    let err = env.state.accounts.get_user("missing").await.unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
}

#[tokio::test]
async fn test_refresh_rotation_with_tracking() {
    let mut settings = test_settings();
    settings.jwt.track_rotation = true;
    let env = setup_test_env_with(&settings);
    registered(&env).await;

    let login = env.state.accounts.login(login_request(PASSWORD)).await.unwrap();
    let rotated = env.state.accounts.refresh(&login.tokens.refresh_token).await.unwrap();
    assert_ne!(rotated.refresh_token, login.tokens.refresh_token);
    env.state.accounts.refresh(&rotated.refresh_token).await.unwrap();

    let err = env.state.accounts.refresh(&login.tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshTokenReused));

    // Access tokens are never accepted as refresh tokens
    let err = env.state.accounts.refresh(&login.tokens.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidRefreshToken(_)));
}

#[tokio::test]
async fn test_mail_failure_keeps_account() {
    let env = setup_test_env();
    env.mailer.set_failing(true);

    let err = env.state.accounts.register(register_request(EMAIL)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Collaborator);
    assert_eq!(env.store.len().await, 1);

    env.mailer.set_failing(false);
    env.state.accounts.resend_verification(EMAIL).await.unwrap();
    let token = env.mailer.last_token().unwrap();
    env.state.accounts.verify_email(&token).await.unwrap();
}

#[tokio::test]
async fn test_login_upgrades_outdated_hash() {
    let env = setup_test_env();
    registered(&env).await;
    let old_hash = env.store.get_by_email(EMAIL).await.unwrap().unwrap().password_hash;
    assert!(old_hash.contains("ln=4"));

    let mut stronger = test_settings();
    stronger.password.cost = 5;
    let core = Arc::new(AuthCore::with_clock(&stronger, env.clock.clone()).unwrap());
    let state = AppState::with_core(core, env.store.clone(), env.mailer.clone());

    state.accounts.login(login_request(PASSWORD)).await.unwrap();
    let new_hash = env.store.get_by_email(EMAIL).await.unwrap().unwrap().password_hash;
    assert_ne!(old_hash, new_hash);
    assert!(new_hash.contains("ln=5"));

    // The old configuration still verifies the upgraded hash
    env.state.accounts.login(login_request(PASSWORD)).await.unwrap();
}

/// Store that lets another writer change the password right after a flow
/// has read the credential
struct RacingStore {
    inner: Arc<MemoryCredentialStore>,
    pending_hash: Mutex<Option<String>>,
}

impl RacingStore {
    fn new(inner: Arc<MemoryCredentialStore>) -> Self {
        Self {
            inner,
            pending_hash: Mutex::new(None),
        }
    }

    /// Change the password to `hash` after the next lookup by email or id
    fn change_after_next_read(&self, hash: String) {
        *self.pending_hash.lock().unwrap() = Some(hash);
    }

    async fn interleave(&self, found: &Option<Credential>) -> Result<(), StoreError> {
        let pending = self.pending_hash.lock().unwrap().take();
        if let (Some(credential), Some(hash)) = (found, pending) {
            self.inner.update_password(&credential.id, &hash, Utc::now()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for RacingStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        let found = self.inner.get_by_id(id).await?;
        self.interleave(&found).await?;
        Ok(found)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let found = self.inner.get_by_email(email).await?;
        self.interleave(&found).await?;
        Ok(found)
    }

    async fn get_by_verification_token(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        self.inner.get_by_verification_token(token).await
    }

    async fn get_by_reset_token(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        self.inner.get_by_reset_token(token).await
    }

    async fn create(&self, credential: Credential) -> Result<(), StoreError> {
        self.inner.create(credential).await
    }

    async fn update(&self, credential: &Credential) -> Result<(), StoreError> {
        self.inner.update(credential).await
    }

    async fn update_password(&self, id: &str, password_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.update_password(id, password_hash, at).await
    }

    async fn replace_password_hash(
        &self,
        id: &str,
        previous: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.replace_password_hash(id, previous, password_hash, at).await
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.record_login(id, at).await
    }

    async fn set_verification_token(&self, id: &str, token: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.set_verification_token(id, token, at).await
    }

    async fn set_reset_token(&self, id: &str, token: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.set_reset_token(id, token, at).await
    }

    async fn consume_verification_token(&self, token: &str, at: DateTime<Utc>) -> Result<Option<Credential>, StoreError> {
        self.inner.consume_verification_token(token, at).await
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.consume_reset_token(token, password_hash, at).await
    }
}

fn racing_state(env: &TestEnv, core: Arc<AuthCore>) -> (AppState, Arc<RacingStore>) {
    let store = Arc::new(RacingStore::new(env.store.clone()));
    let state = AppState::with_core(core, store.clone(), env.mailer.clone());
    (state, store)
}

#[tokio::test]
async fn test_login_keeps_password_changed_mid_flight() {
    let env = setup_test_env();
    registered(&env).await;
    let (state, store) = racing_state(&env, env.state.core.clone());

    let new_hash = env.state.core.hasher.hash("brand-new-pass").unwrap();
    store.change_after_next_read(new_hash.clone());
    // Verified against the hash read before the change
    state.accounts.login(login_request(PASSWORD)).await.unwrap();

    let stored = env.store.get_by_email(EMAIL).await.unwrap().unwrap();
    assert_eq!(stored.password_hash, new_hash);
    assert!(stored.last_login.is_some());
    env.state.accounts.login(login_request("brand-new-pass")).await.unwrap();
    let err = env.state.accounts.login(login_request(PASSWORD)).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_rehash_does_not_revert_concurrent_change() {
    let env = setup_test_env();
    registered(&env).await;

    let mut stronger = test_settings();
    stronger.password.cost = 5;
    let core = Arc::new(AuthCore::with_clock(&stronger, env.clock.clone()).unwrap());
    let (state, store) = racing_state(&env, core);

    let new_hash = env.state.core.hasher.hash("brand-new-pass").unwrap();
    store.change_after_next_read(new_hash.clone());
    state.accounts.login(login_request(PASSWORD)).await.unwrap();

    let stored = env.store.get_by_email(EMAIL).await.unwrap().unwrap();
    assert_eq!(stored.password_hash, new_hash);
    env.state.accounts.login(login_request("brand-new-pass")).await.unwrap();
}

#[tokio::test]
async fn test_change_password_loses_to_concurrent_change() {
    let env = setup_test_env();
    registered(&env).await;
    let user = env.state.accounts.login(login_request(PASSWORD)).await.unwrap().user;
    let (state, store) = racing_state(&env, env.state.core.clone());

    let new_hash = env.state.core.hasher.hash("brand-new-pass").unwrap();
    store.change_after_next_read(new_hash);
    let err = state
        .accounts
        .change_password(
            &user.id,
            ChangePasswordRequest {
                old_password: PASSWORD.to_string(),
                new_password: "changed-pass".to_string(),
                confirm_password: "changed-pass".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    env.state.accounts.login(login_request("brand-new-pass")).await.unwrap();
    assert!(env.state.accounts.login(login_request("changed-pass")).await.is_err());
}

#[tokio::test]
async fn test_reset_token_redeemed_once_under_concurrency() {
    let env = setup_test_env();
    registered(&env).await;
    env.state.accounts.forgot_password(EMAIL).await.unwrap();
    let token = env.mailer.last_token().unwrap();

    let reset = |password: &str| ResetPasswordRequest {
        token: token.clone(),
        new_password: password.to_string(),
        confirm_password: password.to_string(),
    };
    let (first, second) = tokio::join!(
        env.state.accounts.reset_password(reset("first-new-pass")),
        env.state.accounts.reset_password(reset("second-new-pass")),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AuthError::InvalidTransientToken)));

    let winner = if results[0].is_ok() { "first-new-pass" } else { "second-new-pass" };
    env.state.accounts.login(login_request(winner)).await.unwrap();
}

async fn fastest_failed_login(env: &TestEnv, email: &str) -> StdDuration {
    let mut fastest = StdDuration::MAX;
    for _ in 0..3 {
        let started = Instant::now();
        let err = env
            .state
            .accounts
            .login(LoginRequest {
                email: email.to_string(),
                password: "wrong-password".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        fastest = fastest.min(started.elapsed());
    }
    fastest
}

#[tokio::test]
async fn test_unknown_email_login_runs_the_hasher() {
    let mut settings = test_settings();
    settings.password.cost = 14;
    let env = setup_test_env_with(&settings);
    env.state.accounts.register(register_request(EMAIL)).await.unwrap();

    let wrong_password = fastest_failed_login(&env, EMAIL).await;
    let unknown_email = fastest_failed_login(&env, "nobody@example.com").await;

    // Without a KDF run the unknown path would be orders of magnitude faster
    assert!(
        unknown_email * 4 >= wrong_password,
        "unknown {unknown_email:?} vs wrong password {wrong_password:?}"
    );
}
