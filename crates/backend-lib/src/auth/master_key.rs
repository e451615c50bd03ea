// ============================
// crates/backend-lib/src/auth/master_key.rs
// ============================
//! Privileged master-key bypass.
//!
//! A configured master key is accepted by [`super::ApiKeyRegistry::validate`]
//! without consulting the registry, its status, expiry or IP allowlist. It
//! exists for bootstrapping and operator access. Every acceptance is written
//! to the `keyward::audit` target.
use std::fmt;

use chrono::{DateTime, Utc};
use metrics::counter;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::api_key::{ApiKey, KeyStatus};
use crate::metrics as keys;

/// Name carried by the synthetic record the bypass yields
pub const MASTER_KEY_NAME: &str = "master";

/// The configured master key, compared in constant time
pub struct MasterKey(Zeroizing<String>);

impl MasterKey {
    /// `None` for an empty key, which means the bypass is off
    pub fn new(key: &str) -> Option<Self> {
        (!key.is_empty()).then(|| Self(Zeroizing::new(key.to_string())))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        bool::from(self.0.as_bytes().ct_eq(candidate.as_bytes()))
    }

    /// Record the bypass and build the synthetic long-lived key
    pub(crate) fn grant(&self, client_ip: &str, now: DateTime<Utc>) -> ApiKey {
        tracing::warn!(
            target: "keyward::audit",
            client_ip,
            "master API key accepted, registry checks bypassed"
        );
        counter!(keys::MASTER_KEY_USED).increment(1);
        ApiKey {
            key: String::new(),
            name: MASTER_KEY_NAME.to_string(),
            status: KeyStatus::Active,
            created_at: now,
            expires_at: DateTime::<Utc>::MAX_UTC,
            rate_limit: 0,
            allowed_ips: Vec::new(),
            last_used: Some(now),
        }
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}
