// ============================
// crates/backend-lib/src/auth/transient.rs
// ============================
//! Purpose-scoped single-use tokens (email verification, password reset).
//!
//! The service only mints values and judges their age. Storing and
//! consuming them is the credential store's job.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::token_generator::generate_secure_token;
use crate::clock::SharedClock;
use crate::config::TokenSettings;
use crate::error::AuthError;

/// What a transient token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }

    /// Path the emailed link points at
    pub fn link_path(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "/auth/verify-email",
            TokenPurpose::PasswordReset => "/reset-password",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenPurpose {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_verification" => Ok(TokenPurpose::EmailVerification),
            "password_reset" => Ok(TokenPurpose::PasswordReset),
            other => Err(AuthError::Validation(format!("unknown token purpose `{other}`"))),
        }
    }
}

/// Mints transient tokens and checks their age against a purpose → TTL table
#[derive(Debug, Clone)]
pub struct TransientTokenService {
    ttls: HashMap<TokenPurpose, Duration>,
    shortest: Duration,
    clock: SharedClock,
}

impl TransientTokenService {
    pub fn new(
        ttls: impl IntoIterator<Item = (TokenPurpose, Duration)>,
        clock: SharedClock,
    ) -> Result<Self, AuthError> {
        let ttls: HashMap<_, _> = ttls.into_iter().collect();
        if let Some((purpose, _)) = ttls.iter().find(|(_, ttl)| **ttl <= Duration::zero()) {
            return Err(AuthError::Configuration(format!("TTL for {purpose} must be positive")));
        }
        let shortest = ttls
            .values()
            .min()
            .copied()
            .ok_or_else(|| AuthError::Configuration("transient token TTL table is empty".into()))?;
        Ok(Self {
            ttls,
            shortest,
            clock,
        })
    }

    pub fn from_settings(settings: &TokenSettings, clock: SharedClock) -> Result<Self, AuthError> {
        Self::new(
            [
                (TokenPurpose::EmailVerification, secs(settings.email_verification_ttl_secs)),
                (TokenPurpose::PasswordReset, secs(settings.password_reset_ttl_secs)),
            ],
            clock,
        )
    }

    /// A fresh 256-bit token, hex encoded
    pub fn issue(&self) -> Result<String, AuthError> {
        generate_secure_token()
    }

    /// TTL for a purpose; purposes missing from the table get the shortest TTL
    pub fn ttl(&self, purpose: TokenPurpose) -> Duration {
        self.ttls.get(&purpose).copied().unwrap_or(self.shortest)
    }

    pub fn is_expired(&self, purpose: TokenPurpose, issued_at: DateTime<Utc>) -> bool {
        self.clock.now() - issued_at > self.ttl(purpose)
    }

    /// Same as [`Self::is_expired`] for a purpose given by name
    pub fn is_expired_for(&self, purpose: &str, issued_at: DateTime<Utc>) -> bool {
        let ttl = match purpose.parse::<TokenPurpose>() {
            Ok(purpose) => self.ttl(purpose),
            Err(_) => {
                tracing::warn!(purpose, "unknown token purpose, applying shortest TTL");
                self.shortest
            },
        };
        self.clock.now() - issued_at > ttl
    }

    /// Link sent by mail for the given purpose
    pub fn link_for(&self, purpose: TokenPurpose, base_url: &str, token: &str) -> String {
        let base = format!("{}{}", base_url.trim_end_matches('/'), purpose.link_path());
        build_link(&base, token)
    }
}

/// Append the token as a `token` query parameter
pub fn build_link(base_url: &str, token: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}token={token}")
}

fn secs(n: u64) -> Duration {
    Duration::seconds(i64::try_from(n).unwrap_or(i64::MAX / 1_000))
}
