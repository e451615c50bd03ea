// ============================
// keyward-lib/src/lib.rs
// ============================
//! Credential and token lifecycle core for the Keyward auth server.

pub mod account;
pub mod auth;
pub mod client_ip;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod storage;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::account::{AccountService, CredentialStore, Mailer};
use crate::auth::{
    generate_secure_token, ApiKeyRegistry, PasswordHasher, RateLimiter, TokenSigner,
    TransientTokenService,
};
use crate::client_ip::ClientIpResolver;
use crate::clock::{system_clock, SharedClock};
use crate::config::{PasswordRequirements, Settings};
use crate::error::AuthError;

/// The core components, built once from validated settings
#[derive(Debug)]
pub struct AuthCore {
    pub clock: SharedClock,
    pub hasher: PasswordHasher,
    pub signer: TokenSigner,
    pub transient: TransientTokenService,
    pub api_keys: ApiKeyRegistry,
    pub rate_limiter: RateLimiter,
    pub client_ip: ClientIpResolver,
    pub password_requirements: PasswordRequirements,
    /// Hash of a random secret, verified against when a login email is unknown
    decoy_hash: String,
    /// Base URL for links in outgoing mail
    pub base_url: String,
    /// Whether API routes demand `X-API-Key`
    pub require_api_key: bool,
}

impl AuthCore {
    pub fn from_settings(settings: &Settings) -> Result<Self, AuthError> {
        Self::with_clock(settings, system_clock())
    }

    /// Build every component against the given clock
    ///
    /// Fails with a configuration error before anything serves a request.
    pub fn with_clock(settings: &Settings, clock: SharedClock) -> Result<Self, AuthError> {
        settings.validate()?;

        let hasher = PasswordHasher::new(&settings.password)?;
        let decoy_hash = hasher.hash(&generate_secure_token()?)?;

        let core = Self {
            hasher,
            decoy_hash,
            signer: TokenSigner::from_settings(&settings.jwt, clock.clone())?,
            transient: TransientTokenService::from_settings(&settings.tokens, clock.clone())?,
            api_keys: ApiKeyRegistry::from_settings(&settings.api_keys, clock.clone())?,
            rate_limiter: RateLimiter::new(&settings.rate_limit, clock.clone()),
            client_ip: ClientIpResolver::new(&settings.client_ip)?,
            password_requirements: settings.password_requirements.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            require_api_key: settings.api_keys.required,
            clock,
        };

        tracing::info!(
            api_keys = core.api_keys.len(),
            master_key = core.api_keys.has_master_key(),
            rate_limit = core.rate_limiter.is_enabled(),
            track_rotation = core.signer.rotation_ledger().is_some(),
            "auth core ready"
        );
        Ok(core)
    }

    /// Stored-hash stand-in for unknown accounts, built with the current parameters
    pub fn decoy_hash(&self) -> &str {
        &self.decoy_hash
    }

    /// Drop expired rate windows and rotation ledger entries
    pub fn purge_expired(&self) -> (usize, usize) {
        let windows = self.rate_limiter.purge_expired();
        let ledger = self
            .signer
            .rotation_ledger()
            .map_or(0, |l| l.purge_expired(self.clock.now().timestamp()));
        (windows, ledger)
    }
}

/// Periodically purge expired state until the runtime shuts down
pub fn spawn_maintenance(core: Arc<AuthCore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let (windows, ledger) = core.purge_expired();
            if windows + ledger > 0 {
                tracing::debug!(windows, ledger, "purged expired entries");
            }
        }
    })
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<AuthCore>,
    pub accounts: AccountService,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        settings: &Settings,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AuthError> {
        let core = Arc::new(AuthCore::from_settings(settings)?);
        Ok(Self::with_core(core, store, mailer))
    }

    pub fn with_core(
        core: Arc<AuthCore>,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let accounts = AccountService::new(core.clone(), store, mailer);
        Self { core, accounts }
    }
}
