// ============================
// crates/backend-lib/src/auth/rate_limit.rs
// ============================
//! Fixed-window request rate limiting.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use metrics::counter;

use crate::clock::SharedClock;
use crate::config::{RateLimitSettings, WindowLimit};
use crate::error::AuthError;
use crate::metrics as keys;

/// Counter for one (endpoint, client) pair
#[derive(Debug, Clone)]
struct RateWindow {
    count: u32,
    started_at: DateTime<Utc>,
    length: Duration,
}

impl RateWindow {
    fn open(now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            count: 1,
            started_at: now,
            length,
        }
    }

    fn is_over(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at >= self.length
    }
}

/// Normalized endpoint id: `post.auth_login`, `get.users_id`
///
/// Route templates (`/users/:id`, `/users/{id}`) collapse to one id.
pub fn endpoint_id(method: &str, path: &str) -> String {
    let path: String = path
        .trim_start_matches('/')
        .chars()
        .filter(|c| !matches!(c, ':' | '{' | '}' | '*'))
        .map(|c| if c == '/' { '_' } else { c })
        .collect();
    format!("{}.{}", method.to_ascii_lowercase(), path)
}

/// Rate limiter keyed by endpoint id and client IP
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    default: WindowLimit,
    overrides: HashMap<String, WindowLimit>,
    /// Keyed by (endpoint id, client IP)
    windows: DashMap<(String, String), RateWindow>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings, clock: SharedClock) -> Self {
        Self {
            enabled: settings.enabled,
            default: settings.default,
            overrides: settings.endpoints.clone(),
            windows: DashMap::new(),
            clock,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Limit applying to an endpoint
    pub fn limit_for(&self, endpoint_id: &str) -> WindowLimit {
        self.overrides.get(endpoint_id).copied().unwrap_or(self.default)
    }

    /// Count one request and decide whether it may proceed
    pub fn check(&self, endpoint_id: &str, client_ip: &str) -> Result<(), AuthError> {
        if !self.enabled {
            return Ok(());
        }

        let limit = self.limit_for(endpoint_id);
        let length = Duration::seconds(i64::try_from(limit.window_secs).unwrap_or(i64::MAX / 1_000));
        let now = self.clock.now();

        let count = match self
            .windows
            .entry((endpoint_id.to_owned(), client_ip.to_owned())) {
            Entry::Vacant(slot) => {
                slot.insert(RateWindow::open(now, length));
                1
            },
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if window.is_over(now) {
                    *window = RateWindow::open(now, length);
                } else {
                    window.count = window.count.saturating_add(1);
                }
                window.count
            },
        };

        if count > limit.max {
            counter!(keys::RATE_LIMITED, "endpoint" => endpoint_id.to_string()).increment(1);
            tracing::debug!(endpoint = endpoint_id, client_ip, count, "rate limit exceeded");
            return Err(AuthError::RateLimited {
                max: limit.max,
                window_secs: limit.window_secs,
            });
        }
        Ok(())
    }

    /// Drop windows that have run out; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_over(now));
        before.saturating_sub(self.windows.len())
    }

    /// Number of live windows
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}
