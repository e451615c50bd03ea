// ==============================
// tests/unit/rate_limit_tests.rs
// ==============================
//! This test suite is designed to validate the functionality of the `RateLimiter`
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use keyward_lib::auth::{endpoint_id, RateLimiter};
use keyward_lib::clock::ManualClock;
use keyward_lib::config::{RateLimitSettings, WindowLimit};
use keyward_lib::error::AuthError;

fn limiter(max: u32) -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let settings = RateLimitSettings {
        enabled: true,
        default: WindowLimit { max, window_secs: 60 },
        endpoints: HashMap::new(),
    };
    (RateLimiter::new(&settings, clock.clone()), clock)
}

#[test]
fn test_allows_exactly_max_then_denies() {
    let (limiter, _) = limiter(5);
    let endpoint = endpoint_id("POST", "/auth/login");

    for _ in 0..5 {
        assert!(limiter.check(&endpoint, "127.0.0.1").is_ok());
    }
    assert!(matches!(
        limiter.check(&endpoint, "127.0.0.1"),
        Err(AuthError::RateLimited { max: 5, window_secs: 60 })
    ));
}

#[test]
fn test_counter_restarts_after_window() {
    let (limiter, clock) = limiter(2);
    let endpoint = endpoint_id("GET", "/auth/me");

    assert!(limiter.check(&endpoint, "127.0.0.1").is_ok());
    assert!(limiter.check(&endpoint, "127.0.0.1").is_ok());
    assert!(limiter.check(&endpoint, "127.0.0.1").is_err());

    clock.advance(Duration::seconds(61));
    // New window: one call used, one remaining
    assert!(limiter.check(&endpoint, "127.0.0.1").is_ok());
    assert!(limiter.check(&endpoint, "127.0.0.1").is_ok());
    assert!(limiter.check(&endpoint, "127.0.0.1").is_err());
}

#[test]
fn test_parametrized_paths_share_a_counter() {
    assert_eq!(endpoint_id("GET", "/users/:id"), endpoint_id("get", "/users/{id}"));
}

#[test]
fn test_denied_calls_do_not_extend_the_window() {
    let (limiter, clock) = limiter(1);
    assert!(limiter.check("get.x", "1.1.1.1").is_ok());
    for _ in 0..10 {
        clock.advance(Duration::seconds(5));
        assert!(limiter.check("get.x", "1.1.1.1").is_err());
    }
    clock.advance(Duration::seconds(10));
    assert!(limiter.check("get.x", "1.1.1.1").is_ok());
}
