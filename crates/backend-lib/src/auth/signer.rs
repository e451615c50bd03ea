// ============================
// crates/backend-lib/src/auth/signer.rs
// ============================
//! Signed access and refresh tokens.
//!
//! Tokens use the compact `header.payload.signature` layout, every segment
//! base64url without padding, signed with HMAC-SHA256. Access and refresh
//! tokens are signed with two distinct secrets and carry a `token_use` tag,
//! so neither can stand in for the other.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use keyward_common::TokenPair;
use metrics::counter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::rotation::RotationLedger;
use super::token_generator::generate_secure_token_with_size;
use crate::clock::SharedClock;
use crate::config::{JwtSettings, MIN_SECRET_LEN};
use crate::error::{AuthError, TokenError};
use crate::metrics as keys;

type HmacSha256 = Hmac<Sha256>;

/// The only accepted signing algorithm
pub const ALGORITHM: &str = "HS256";

const TOKEN_TYPE: &str = "JWT";
const JTI_BYTES: usize = 16;

/// Which secret a token belongs to
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Claims of an access token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    pub email: String,
    pub role: String,
    /// Issued at, unix seconds
    pub iat: i64,
    /// Not before, unix seconds
    pub nbf: i64,
    /// Expires at, unix seconds
    pub exp: i64,
    /// Unique token id
    pub jti: String,
    pub token_use: TokenUse,
}

/// Claims of a refresh token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
    pub token_use: TokenUse,
}

/// Common view over both claim kinds
pub trait TokenClaims: Serialize + DeserializeOwned {
    const USE: TokenUse;

    fn token_use(&self) -> TokenUse;
    fn not_before(&self) -> i64;
    fn expires_at(&self) -> i64;
}

impl TokenClaims for AccessClaims {
    const USE: TokenUse = TokenUse::Access;

    fn token_use(&self) -> TokenUse {
        self.token_use
    }

    fn not_before(&self) -> i64 {
        self.nbf
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl TokenClaims for RefreshClaims {
    const USE: TokenUse = TokenUse::Refresh;

    fn token_use(&self) -> TokenUse {
        self.token_use
    }

    fn not_before(&self) -> i64 {
        self.nbf
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// HMAC key material, wiped on drop
pub struct SigningSecret(Zeroizing<Vec<u8>>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, AuthError> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.len() < MIN_SECRET_LEN {
            return Err(AuthError::Configuration(format!(
                "signing secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self(bytes))
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.0)
            .map_err(|e| AuthError::Crypto(format!("invalid HMAC key: {e}")))
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Sign claims with the given secret
pub fn sign<C: TokenClaims>(claims: &C, secret: &SigningSecret) -> Result<String, AuthError> {
    let header = Header {
        alg: ALGORITHM.to_string(),
        typ: Some(TOKEN_TYPE.to_string()),
    };
    let header = encode_segment(&header)?;
    let payload = encode_segment(claims)?;

    let mut mac = secret.mac()?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{header}.{payload}.{signature}"))
}

/// Verify a token against a secret at the given instant
pub fn verify<C: TokenClaims>(
    token: &str,
    secret: &SigningSecret,
    now: DateTime<Utc>,
) -> Result<C, TokenError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let header: Header = decode_segment(header_b64)?;
    if header.alg != ALGORITHM {
        tracing::warn!(alg = %header.alg, "rejected token with unexpected signing algorithm");
        return Err(TokenError::InvalidSignature);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| TokenError::Malformed)?;
    let mut mac = secret.mac().map_err(|_| TokenError::InvalidSignature)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let claims: C = decode_segment(payload_b64)?;
    if claims.token_use() != C::USE {
        return Err(TokenError::Malformed);
    }

    let now = now.timestamp();
    if now < claims.not_before() {
        return Err(TokenError::NotYetValid);
    }
    if now >= claims.expires_at() {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

fn encode_segment<T: Serialize + ?Sized>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| AuthError::Crypto(format!("failed to encode token segment: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

/// Issues, verifies and rotates access/refresh tokens
#[derive(Debug)]
pub struct TokenSigner {
    access_secret: SigningSecret,
    refresh_secret: SigningSecret,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: SharedClock,
    ledger: Option<Arc<RotationLedger>>,
}

impl TokenSigner {
    pub fn new(
        access_secret: SigningSecret,
        refresh_secret: SigningSecret,
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: SharedClock,
    ) -> Result<Self, AuthError> {
        if bool::from(access_secret.0.as_slice().ct_eq(refresh_secret.0.as_slice())) {
            return Err(AuthError::Configuration(
                "access and refresh secrets must differ".to_string(),
            ));
        }
        if access_ttl.as_secs() == 0 || refresh_ttl.as_secs() == 0 {
            return Err(AuthError::Configuration(
                "token TTLs must be at least one second".to_string(),
            ));
        }
        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
            clock,
            ledger: None,
        })
    }

    pub fn from_settings(settings: &JwtSettings, clock: SharedClock) -> Result<Self, AuthError> {
        let signer = Self::new(
            SigningSecret::new(settings.access_secret.as_bytes())?,
            SigningSecret::new(settings.refresh_secret.as_bytes())?,
            Duration::from_secs(settings.access_ttl_secs),
            Duration::from_secs(settings.refresh_ttl_secs),
            clock,
        )?;
        Ok(if settings.track_rotation {
            signer.with_rotation_tracking()
        } else {
            signer
        })
    }

    /// Reject refresh tokens that were already exchanged
    pub fn with_rotation_tracking(mut self) -> Self {
        self.ledger = Some(Arc::new(RotationLedger::new()));
        self
    }

    pub fn rotation_ledger(&self) -> Option<&Arc<RotationLedger>> {
        self.ledger.as_ref()
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access token
    pub fn issue_access(&self, subject: &str, email: &str, role: &str) -> Result<String, AuthError> {
        let now = self.clock.now().timestamp();
        let claims = AccessClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: now,
            nbf: now,
            exp: now + ttl_secs(self.access_ttl),
            jti: generate_secure_token_with_size(JTI_BYTES)?,
            token_use: TokenUse::Access,
        };
        let token = sign(&claims, &self.access_secret)?;
        counter!(keys::TOKEN_ISSUED, "kind" => "access").increment(1);
        Ok(token)
    }

    fn issue_refresh(&self, subject: &str, email: &str, role: &str) -> Result<String, AuthError> {
        let now = self.clock.now().timestamp();
        let claims = RefreshClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: now,
            nbf: now,
            exp: now + ttl_secs(self.refresh_ttl),
            jti: generate_secure_token_with_size(JTI_BYTES)?,
            token_use: TokenUse::Refresh,
        };
        let token = sign(&claims, &self.refresh_secret)?;
        counter!(keys::TOKEN_ISSUED, "kind" => "refresh").increment(1);
        Ok(token)
    }

    /// Issue an access token and an independently signed refresh token
    pub fn issue_access_refresh_pair(
        &self,
        subject: &str,
        email: &str,
        role: &str,
    ) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access(subject, email, role)?,
            refresh_token: self.issue_refresh(subject, email, role)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.as_secs(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(token, &self.access_secret, self.clock.now()).inspect_err(|e| {
            counter!(keys::TOKEN_REJECTED, "kind" => "access", "reason" => reason(*e)).increment(1);
        })
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        verify(token, &self.refresh_secret, self.clock.now()).inspect_err(|e| {
            counter!(keys::TOKEN_REJECTED, "kind" => "refresh", "reason" => reason(*e)).increment(1);
        })
    }

    /// Exchange a refresh token for a brand-new pair for the same subject
    pub fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.verify_refresh(refresh_token).map_err(|e| {
            tracing::debug!(reason = %e, "refresh token rejected");
            AuthError::InvalidRefreshToken(e)
        })?;

        if let Some(ledger) = &self.ledger {
            if !ledger.consume(&claims.jti, claims.exp) {
                tracing::warn!(subject = %claims.sub, "replayed refresh token rejected");
                counter!(keys::TOKEN_REPLAYED).increment(1);
                return Err(AuthError::RefreshTokenReused);
            }
        }

        let pair = self.issue_access_refresh_pair(&claims.sub, &claims.email, &claims.role)?;
        counter!(keys::TOKEN_ROTATED).increment(1);
        tracing::debug!(subject = %claims.sub, "refresh token rotated");
        Ok(pair)
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2)
}

fn reason(e: TokenError) -> &'static str {
    match e {
        TokenError::Expired => "expired",
        TokenError::NotYetValid => "not_yet_valid",
        TokenError::InvalidSignature => "invalid_signature",
        TokenError::Malformed => "malformed",
    }
}
