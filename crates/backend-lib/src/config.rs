// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use chrono::{DateTime, Utc};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use ipnetwork::IpNetwork;
use serde::Deserialize;

use crate::error::AuthError;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "keyward.toml";

/// Environment variable prefix; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "KEYWARD_";

/// Minimum length of a signing secret in bytes
pub const MIN_SECRET_LEN: usize = 32;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Public base URL used to build verification and reset links
    pub base_url: String,
    /// Access/refresh token signing
    pub jwt: JwtSettings,
    /// Password hashing algorithm and cost
    pub password: PasswordSettings,
    /// Password complexity requirements
    pub password_requirements: PasswordRequirements,
    /// Transient token lifetimes
    pub tokens: TokenSettings,
    /// API key validation
    pub api_keys: ApiKeySettings,
    /// Request rate limiting
    pub rate_limit: RateLimitSettings,
    /// Client IP resolution
    pub client_ip: ClientIpSettings,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Access/refresh token signing settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Reject refresh tokens that were already rotated
    pub track_rotation: bool,
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("access_secret", &redact(&self.access_secret))
            .field("refresh_secret", &redact(&self.refresh_secret))
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("track_rotation", &self.track_rotation)
            .finish()
    }
}

/// Supported password hashing algorithms
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Scrypt,
    Argon2id,
}

/// Password hashing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub algorithm: HashAlgorithm,
    /// scrypt: log2(N); argon2id: iterations
    pub cost: u32,
    /// argon2id memory in KiB
    pub argon2_memory_kib: u32,
}

/// Password complexity requirements
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordRequirements {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
    /// Require uppercase letters
    pub require_uppercase: bool,
    /// Require lowercase letters
    pub require_lowercase: bool,
    /// Require digits
    pub require_digit: bool,
    /// Require special characters
    pub require_special: bool,
}

/// Transient token lifetimes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    pub email_verification_ttl_secs: u64,
    pub password_reset_ttl_secs: u64,
}

/// API key settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ApiKeySettings {
    /// Privileged key that bypasses the registry
    pub master_key: Option<String>,
    /// Require `X-API-Key` on every API route
    pub required: bool,
    /// Keys loaded into the registry at startup
    pub keys: Vec<StaticApiKey>,
}

impl ApiKeySettings {
    /// The master key, treating an empty value as unset
    pub fn master_key(&self) -> Option<&str> {
        self.master_key.as_deref().filter(|k| !k.is_empty())
    }
}

impl fmt::Debug for ApiKeySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeySettings")
            .field("master_key", &self.master_key().map(redact))
            .field("required", &self.required)
            .field("keys", &self.keys)
            .finish()
    }
}

/// An API key declared in configuration
#[derive(Clone, Deserialize)]
pub struct StaticApiKey {
    pub name: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub rate_limit: u32,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

impl fmt::Debug for StaticApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticApiKey")
            .field("name", &self.name)
            .field("key", &redact(&self.key))
            .field("expires_at", &self.expires_at)
            .field("rate_limit", &self.rate_limit)
            .field("allowed_ips", &self.allowed_ips)
            .finish()
    }
}

/// Maximum requests within one fixed window
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct WindowLimit {
    pub max: u32,
    pub window_secs: u64,
}

/// Rate limit settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub default: WindowLimit,
    /// Overrides keyed by endpoint id, e.g. `post.auth_login`
    pub endpoints: HashMap<String, WindowLimit>,
}

/// Client IP resolution settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientIpSettings {
    /// Proxies whose forwarding headers are trusted, as CIDRs
    pub trusted_proxies: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            base_url: "http://localhost:3000".to_string(),
            jwt: JwtSettings::default(),
            password: PasswordSettings::default(),
            password_requirements: PasswordRequirements::default(),
            tokens: TokenSettings::default(),
            api_keys: ApiKeySettings::default(),
            rate_limit: RateLimitSettings::default(),
            client_ip: ClientIpSettings::default(),
        }
    }
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            track_rotation: false,
        }
    }
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Scrypt,
            cost: 15,
            argon2_memory_kib: 19_456,
        }
    }
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            email_verification_ttl_secs: 24 * 60 * 60,
            password_reset_ttl_secs: 60 * 60,
        }
    }
}

impl Default for ApiKeySettings {
    fn default() -> Self {
        Self {
            master_key: None,
            required: false,
            keys: Vec::new(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default: WindowLimit {
                max: 100,
                window_secs: 60,
            },
            endpoints: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from `keyward.toml` and the environment
    pub fn load() -> Result<Self, AuthError> {
        Self::extract(Figment::new().merge(Toml::file(DEFAULT_CONFIG_FILE)))
    }

    /// Load settings from an explicit file; the file must exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AuthError::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::extract(Figment::new().merge(Toml::file(path)))
    }

    fn extract(figment: Figment) -> Result<Self, AuthError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AuthError::Configuration(e.to_string()))
    }

    /// Check invariants that must hold before anything is constructed
    pub fn validate(&self) -> Result<(), AuthError> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(invalid(format!("unknown log level `{}`", self.log_level)));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(invalid("base_url must be an http(s) URL"));
        }

        self.jwt.validate()?;
        self.password.validate()?;

        let req = &self.password_requirements;
        if req.min_length < 6 || req.max_length < req.min_length {
            return Err(invalid("password_requirements: min_length must be >= 6 and <= max_length"));
        }

        if self.tokens.email_verification_ttl_secs == 0 || self.tokens.password_reset_ttl_secs == 0 {
            return Err(invalid("tokens: TTLs must be positive"));
        }

        self.rate_limit.validate()?;

        for cidr in &self.client_ip.trusted_proxies {
            cidr.parse::<IpNetwork>()
                .map_err(|e| invalid(format!("client_ip.trusted_proxies: `{cidr}`: {e}")))?;
        }

        Ok(())
    }
}

impl JwtSettings {
    fn validate(&self) -> Result<(), AuthError> {
        for (name, secret) in [("access_secret", &self.access_secret), ("refresh_secret", &self.refresh_secret)] {
            if secret.len() < MIN_SECRET_LEN {
                return Err(invalid(format!(
                    "jwt.{name} must be at least {MIN_SECRET_LEN} bytes"
                )));
            }
        }
        if self.access_secret == self.refresh_secret {
            return Err(invalid("jwt: access and refresh secrets must differ"));
        }
        if self.access_ttl_secs == 0 || self.refresh_ttl_secs == 0 {
            return Err(invalid("jwt: TTLs must be positive"));
        }
        Ok(())
    }
}

impl PasswordSettings {
    /// Check the cost range for the chosen algorithm
    pub fn validate(&self) -> Result<(), AuthError> {
        let ok = match self.algorithm {
            HashAlgorithm::Scrypt => (4..=22).contains(&self.cost),
            HashAlgorithm::Argon2id => (1..=10).contains(&self.cost) && self.argon2_memory_kib >= 8,
        };
        if ok {
            Ok(())
        } else {
            Err(invalid(format!(
                "password: cost {} out of range for {:?}",
                self.cost, self.algorithm
            )))
        }
    }
}

impl RateLimitSettings {
    fn validate(&self) -> Result<(), AuthError> {
        let limits = std::iter::once(("default", &self.default))
            .chain(self.endpoints.iter().map(|(k, v)| (k.as_str(), v)));
        for (name, limit) in limits {
            if limit.max == 0 || limit.window_secs == 0 {
                return Err(invalid(format!(
                    "rate_limit.{name}: max and window_secs must be positive"
                )));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> AuthError {
    AuthError::Configuration(msg.into())
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}
