// ==========================
// tests/unit/config_tests.rs
// ==========================
//! Unit tests for the configuration module
use std::fs;

use keyward_lib::config::{HashAlgorithm, LogFormat, Settings};
use keyward_lib::error::ErrorKind;
use keyward_lib::AuthCore;
use tempfile::tempdir;

use crate::test_utils::{ACCESS_SECRET, REFRESH_SECRET};

#[test]
fn test_settings_default() {
    let settings = Settings::default();

    assert_eq!(settings.bind_addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.log_format, LogFormat::Pretty);
    assert_eq!(settings.jwt.access_ttl_secs, 900);
    assert!(!settings.jwt.track_rotation);
    assert_eq!(settings.password.algorithm, HashAlgorithm::Scrypt);
    assert_eq!(settings.password.cost, 15);
    assert_eq!(settings.tokens.email_verification_ttl_secs, 86_400);
    assert_eq!(settings.tokens.password_reset_ttl_secs, 3_600);
    assert!(settings.rate_limit.enabled);
    assert_eq!(settings.rate_limit.default.max, 100);
    assert_eq!(settings.rate_limit.default.window_secs, 60);
}

#[test]
fn test_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        format!(
            r#"
            base_url = "https://auth.example.com"
            log_format = "json"

            [jwt]
            access_secret = "{ACCESS_SECRET}"
            refresh_secret = "{REFRESH_SECRET}"

            [password]
            algorithm = "argon2id"
            cost = 2

            [api_keys]
            master_key = "ops-master"
            required = true

            [[api_keys.keys]]
            name = "ci"
            key = "kw_ci"
            expires_at = "2099-01-01T00:00:00Z"
            allowed_ips = ["10.0.0.0/8"]

            [rate_limit]
            enabled = false
            "#
        ),
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.log_format, LogFormat::Json);
    assert_eq!(settings.password.algorithm, HashAlgorithm::Argon2id);
    assert!(settings.api_keys.required);
    assert_eq!(settings.api_keys.master_key(), Some("ops-master"));
    assert_eq!(settings.api_keys.keys.len(), 1);
    assert!(!settings.rate_limit.enabled);

    let core = AuthCore::from_settings(&settings).unwrap();
    assert!(core.api_keys.validate("kw_ci", "10.1.1.1").is_ok());
    assert!(core.require_api_key);
}

#[test]
fn test_invalid_config_aborts_core_construction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        format!(
            r#"
            [jwt]
            access_secret = "{ACCESS_SECRET}"
            refresh_secret = "{ACCESS_SECRET}"
            "#
        ),
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    let err = AuthCore::from_settings(&settings).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationFailure);
}

#[test]
fn test_malformed_file_is_configuration_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[jwt\naccess_secret = ").unwrap();
    let err = Settings::load_from(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationFailure);
}
