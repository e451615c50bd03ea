// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing and verification.
//!
//! Hashes are PHC strings (`$scrypt$ln=15,r=8,p=1$...` or `$argon2id$v=19$m=...`),
//! so the algorithm and its cost travel with every stored hash. Verification
//! reads them back from the hash, never from the current configuration.
use argon2::{Algorithm, Argon2, Params as Argon2Params, Version};
use scrypt::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as PhcHasher, PasswordVerifier, SaltString,
    },
    Params as ScryptParams, Scrypt,
};
use zeroize::Zeroize;

use crate::config::{HashAlgorithm, PasswordRequirements, PasswordSettings};
use crate::error::AuthError;

const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const OUTPUT_LEN: usize = 32;
const ARGON2_PARALLELISM: u32 = 1;

/// Salted, slow, versioned password hashing
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    kind: HasherKind,
}

#[derive(Debug, Clone)]
enum HasherKind {
    Scrypt(ScryptParams),
    Argon2id(Argon2Params),
}

impl PasswordHasher {
    /// Build a hasher from configuration
    pub fn new(settings: &PasswordSettings) -> Result<Self, AuthError> {
        match settings.algorithm {
            HashAlgorithm::Scrypt => Self::scrypt(settings.cost),
            HashAlgorithm::Argon2id => Self::argon2id(settings.cost, settings.argon2_memory_kib),
        }
    }

    /// scrypt with N = 2^`log_n`
    pub fn scrypt(log_n: u32) -> Result<Self, AuthError> {
        let log_n = u8::try_from(log_n)
            .map_err(|_| AuthError::Configuration(format!("scrypt cost {log_n} too large")))?;
        let params = ScryptParams::new(log_n, SCRYPT_R, SCRYPT_P, OUTPUT_LEN)
            .map_err(|e| AuthError::Configuration(format!("invalid scrypt parameters: {e}")))?;
        Ok(Self {
            kind: HasherKind::Scrypt(params),
        })
    }

    /// argon2id with the given iteration count and memory
    pub fn argon2id(iterations: u32, memory_kib: u32) -> Result<Self, AuthError> {
        let params = Argon2Params::new(memory_kib, iterations, ARGON2_PARALLELISM, Some(OUTPUT_LEN))
            .map_err(|e| AuthError::Configuration(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self {
            kind: HasherKind::Argon2id(params),
        })
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, plain: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = match &self.kind {
            HasherKind::Scrypt(params) => {
                Scrypt.hash_password_customized(plain.as_bytes(), None, None, *params, &salt)
            },
            HasherKind::Argon2id(params) => {
                Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
                    .hash_password(plain.as_bytes(), &salt)
            },
        }
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            AuthError::Crypto(format!("password hashing failed: {e}"))
        })?;
        Ok(hash.to_string())
    }

    /// Securely hash a password and zeroize the original
    pub fn hash_secure(&self, plain: &mut String) -> Result<String, AuthError> {
        let hash = self.hash(plain);
        plain.zeroize();
        hash
    }

    /// Verify a password against a stored hash
    ///
    /// Returns false for a malformed or unsupported hash.
    pub fn verify(&self, plain: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            tracing::debug!("stored password hash is not a PHC string");
            return false;
        };
        let argon2 = Argon2::default();
        let verifiers: [&dyn PasswordVerifier; 2] = [&Scrypt, &argon2];
        parsed.verify_password(&verifiers, plain).is_ok()
    }

    /// Whether a stored hash was produced with other parameters than ours
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };
        match &self.kind {
            HasherKind::Scrypt(params) => {
                parsed.algorithm.as_str() != "scrypt"
                    || ScryptParams::try_from(&parsed).map_or(true, |p| {
                        p.log_n() != params.log_n() || p.r() != params.r() || p.p() != params.p()
                    })
            },
            HasherKind::Argon2id(params) => {
                parsed.algorithm.as_str() != "argon2id"
                    || Argon2Params::try_from(&parsed).map_or(true, |p| {
                        p.m_cost() != params.m_cost() || p.t_cost() != params.t_cost()
                    })
            },
        }
    }
}

/// Check if a password meets the complexity requirements
pub fn validate_password_strength(password: &str, requirements: &PasswordRequirements) -> bool {
    let len = password.chars().count();
    if len < requirements.min_length || len > requirements.max_length {
        return false;
    }

    if requirements.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        return false;
    }

    if requirements.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        return false;
    }

    if requirements.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }

    if requirements.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
        return false;
    }

    true
}
