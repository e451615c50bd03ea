// ============================
// crates/backend-lib/src/auth/api_key.rs
// ============================
//! In-memory API key registry.
//!
//! Records are immutable once inserted; `add` swaps in a whole new record, so a
//! reader holding the previous `Arc` never sees a half-written key. Only the
//! last-used timestamp changes in place, through an atomic.
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use ipnetwork::IpNetwork;
use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;

use super::master_key::MasterKey;
use crate::clock::SharedClock;
use crate::config::ApiKeySettings;
use crate::error::{ApiKeyError, AuthError};
use crate::metrics as keys;

const NEVER_USED: i64 = i64::MIN;

/// Lifecycle state of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

/// An API key record
#[derive(Clone, Serialize)]
pub struct ApiKey {
    #[serde(skip)]
    pub key: String,
    pub name: String,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Requests per minute granted to this key; informational
    pub rate_limit: u32,
    /// CIDRs (or bare addresses) allowed to use this key; empty allows all
    pub allowed_ips: Vec<String>,
    pub last_used: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            status: KeyStatus::Active,
            created_at,
            expires_at,
            rate_limit: 0,
            allowed_ips: Vec::new(),
            last_used: None,
        }
    }

    pub fn with_allowed_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ips = ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit = per_minute;
        self
    }

    pub fn with_status(mut self, status: KeyStatus) -> Self {
        self.status = status;
        self
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("expires_at", &self.expires_at)
            .field("rate_limit", &self.rate_limit)
            .field("allowed_ips", &self.allowed_ips)
            .field("last_used", &self.last_used)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Entry {
    record: ApiKey,
    allowlist: Vec<IpNetwork>,
    last_used_ms: AtomicI64,
}

impl Entry {
    fn new(record: ApiKey) -> Self {
        let allowlist = record
            .allowed_ips
            .iter()
            .filter_map(|raw| match raw.trim().parse::<IpNetwork>() {
                Ok(net) => Some(net),
                Err(_) => {
                    tracing::warn!(key = %record.name, entry = %raw, "skipping unparseable allowlist entry");
                    None
                },
            })
            .collect();
        let last_used_ms = AtomicI64::new(
            record
                .last_used
                .map_or(NEVER_USED, |t| t.timestamp_millis()),
        );
        Self {
            record,
            allowlist,
            last_used_ms,
        }
    }

    fn ip_allowed(&self, client_ip: &str) -> bool {
        if self.record.allowed_ips.is_empty() {
            return true;
        }
        let Ok(ip) = client_ip.trim().parse::<IpAddr>() else {
            return false;
        };
        self.allowlist.iter().any(|net| net.contains(ip))
    }

    fn snapshot(&self) -> ApiKey {
        let mut record = self.record.clone();
        let ms = self.last_used_ms.load(Ordering::Relaxed);
        record.last_used = (ms != NEVER_USED)
            .then(|| Utc.timestamp_millis_opt(ms).single())
            .flatten();
        record
    }
}

/// Concurrency-safe cache of API keys with an optional master-key bypass
#[derive(Debug)]
pub struct ApiKeyRegistry {
    keys: RwLock<HashMap<String, Arc<Entry>>>,
    master: Option<MasterKey>,
    clock: SharedClock,
}

impl ApiKeyRegistry {
    pub fn new(master_key: Option<&str>, clock: SharedClock) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            master: master_key.and_then(MasterKey::new),
            clock,
        }
    }

    /// Build the registry and seed it with the statically configured keys
    pub fn from_settings(settings: &ApiKeySettings, clock: SharedClock) -> Result<Self, AuthError> {
        let registry = Self::new(settings.master_key(), clock);
        for key in &settings.keys {
            if key.key.is_empty() {
                return Err(AuthError::Configuration(format!(
                    "api_keys: key `{}` has an empty value",
                    key.name
                )));
            }
            let record = ApiKey::new(key.key.clone(), key.name.clone(), registry.clock.now(), key.expires_at)
                .with_rate_limit(key.rate_limit)
                .with_allowed_ips(key.allowed_ips.iter().cloned());
            registry.add(record);
        }
        Ok(registry)
    }

    pub fn has_master_key(&self) -> bool {
        self.master.is_some()
    }

    /// Check a presented key for the given client IP
    pub fn validate(&self, key: &str, client_ip: &str) -> Result<ApiKey, ApiKeyError> {
        let now = self.clock.now();

        if let Some(master) = &self.master {
            if master.matches(key) {
                return Ok(master.grant(client_ip, now));
            }
        }

        self.validate_registered(key, client_ip, now)
            .inspect_err(|e| {
                counter!(keys::API_KEY_REJECTED, "reason" => reason(*e)).increment(1);
                tracing::debug!(client_ip, reason = %e, "API key rejected");
            })
    }

    fn validate_registered(
        &self,
        key: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, ApiKeyError> {
        let entry = self
            .keys
            .read()
            .get(key)
            .cloned()
            .ok_or(ApiKeyError::InvalidKey)?;

        if entry.record.status != KeyStatus::Active {
            return Err(ApiKeyError::KeyRevoked);
        }
        if now >= entry.record.expires_at {
            return Err(ApiKeyError::KeyExpired);
        }
        if !entry.ip_allowed(client_ip) {
            return Err(ApiKeyError::IpNotAllowed);
        }

        entry
            .last_used_ms
            .fetch_max(now.timestamp_millis(), Ordering::Relaxed);
        Ok(entry.snapshot())
    }

    /// Insert or replace a key
    pub fn add(&self, key: ApiKey) {
        let name = key.name.clone();
        let entry = Arc::new(Entry::new(key));
        let replaced = self
            .keys
            .write()
            .insert(entry.record.key.clone(), entry)
            .is_some();
        tracing::info!(key = %name, replaced, "API key registered");
    }

    /// Remove a key; returns whether it was present
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.keys.write().remove(key);
        if let Some(entry) = &removed {
            tracing::info!(key = %entry.record.name, "API key removed");
        }
        removed.is_some()
    }

    /// Mark a key revoked without dropping it; returns whether it was present
    pub fn revoke(&self, key: &str) -> bool {
        let mut keys = self.keys.write();
        let Some(current) = keys.get(key) else {
            return false;
        };
        let revoked = current.snapshot().with_status(KeyStatus::Revoked);
        tracing::info!(key = %revoked.name, "API key revoked");
        keys.insert(key.to_string(), Arc::new(Entry::new(revoked)));
        true
    }

    pub fn get(&self, key: &str) -> Option<ApiKey> {
        self.keys.read().get(key).map(|entry| entry.snapshot())
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

fn reason(e: ApiKeyError) -> &'static str {
    match e {
        ApiKeyError::InvalidKey => "invalid",
        ApiKeyError::KeyExpired => "expired",
        ApiKeyError::KeyRevoked => "revoked",
        ApiKeyError::IpNotAllowed => "ip_not_allowed",
    }
}
