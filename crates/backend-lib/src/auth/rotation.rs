// ============================
// crates/backend-lib/src/auth/rotation.rs
// ============================
//! Ledger of refresh tokens that were already exchanged.
//!
//! Only consulted when rotation tracking is enabled. Entries live until the
//! refresh token they describe would have expired anyway.
use dashmap::{mapref::entry::Entry, DashMap};

/// Consumed refresh token ids mapped to their expiry (unix seconds)
#[derive(Debug, Default)]
pub struct RotationLedger {
    consumed: DashMap<String, i64>,
}

impl RotationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a refresh token as used
    ///
    /// Returns false when it had already been used. The check and the insert
    /// happen under one shard lock, so two racing rotations cannot both win.
    pub fn consume(&self, jti: &str, expires_at: i64) -> bool {
        match self.consumed.entry(jti.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            },
        }
    }

    pub fn is_consumed(&self, jti: &str) -> bool {
        self.consumed.contains_key(jti)
    }

    /// Drop entries whose token has expired; returns how many were removed
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.consumed.len();
        self.consumed.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.consumed.len())
    }

    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}
