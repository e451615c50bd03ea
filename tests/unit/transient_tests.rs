// ============================
// tests/unit/transient_tests.rs
// ============================
use std::sync::Arc;

use chrono::Duration;
use keyward_lib::auth::{build_link, TokenPurpose, TransientTokenService};
use keyward_lib::clock::{Clock, ManualClock};
use keyward_lib::config::TokenSettings;

#[test]
fn test_expiry_per_purpose() {
    let clock = Arc::new(ManualClock::starting_now());
    let service = TransientTokenService::from_settings(&TokenSettings::default(), clock.clone()).unwrap();
    let issued = clock.now();

    assert!(!service.is_expired(TokenPurpose::EmailVerification, issued));
    assert!(!service.is_expired(TokenPurpose::PasswordReset, issued));

    clock.advance(Duration::hours(1) + Duration::seconds(1));
    assert!(service.is_expired(TokenPurpose::PasswordReset, issued));
    assert!(!service.is_expired(TokenPurpose::EmailVerification, issued));

    clock.set(issued + Duration::hours(24) + Duration::seconds(1));
    assert!(service.is_expired(TokenPurpose::EmailVerification, issued));
}

#[test]
fn test_unknown_purpose_never_gets_longest_ttl() {
    let clock = Arc::new(ManualClock::starting_now());
    let service = TransientTokenService::from_settings(&TokenSettings::default(), clock.clone()).unwrap();
    let issued = clock.now();

    clock.advance(Duration::minutes(61));
    assert!(service.is_expired_for("account_deletion", issued));
    assert!(!service.is_expired_for("email_verification", issued));
}

#[test]
fn test_tokens_are_distinct_hex() {
    let clock = Arc::new(ManualClock::starting_now());
    let service = TransientTokenService::from_settings(&TokenSettings::default(), clock).unwrap();
    let a = service.issue().unwrap();
    let b = service.issue().unwrap();
    assert_ne!(a, b);
    assert_eq!(a.len(), 64);
}

#[test]
fn test_build_link() {
    assert_eq!(
        build_link("https://app.example.com/verify", "deadbeef"),
        "https://app.example.com/verify?token=deadbeef"
    );
}
