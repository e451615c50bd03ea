// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Request input validation.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::auth::validate_password_strength;
use crate::config::PasswordRequirements;
use crate::error::AuthError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit
const MAX_NAME_LENGTH: usize = 100;
const TRANSIENT_TOKEN_LENGTH: usize = 64;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^<>/\\{}\[\];]*$").unwrap());

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid token format")]
    InvalidTokenFormat,
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidTokenFormat => AuthError::InvalidTransientToken,
            other => AuthError::Validation(other.to_string()),
        }
    }
}

/// Trim and lowercase an email address for lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult<&str> {
    if email.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "Email address cannot be empty".to_string(),
        ));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "Email address cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "Invalid email address format".to_string(),
        ));
    }

    Ok(email)
}

/// Validate a display name
pub fn validate_name(name: &str) -> ValidationResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidName("Name must not be empty".to_string()));
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName(format!(
            "Name must be between 1 and {MAX_NAME_LENGTH} characters"
        )));
    }

    if !NAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidName(
            "Name contains invalid characters".to_string(),
        ));
    }

    Ok(trimmed)
}

/// Validate a new password and its confirmation
pub fn validate_new_password<'a>(
    password: &'a str,
    confirmation: &str,
    requirements: &PasswordRequirements,
) -> ValidationResult<&'a str> {
    if password != confirmation {
        return Err(ValidationError::InvalidPassword(
            "Passwords do not match".to_string(),
        ));
    }

    if !validate_password_strength(password, requirements) {
        return Err(ValidationError::InvalidPassword(describe(requirements)));
    }

    Ok(password)
}

fn describe(req: &PasswordRequirements) -> String {
    let mut rules = vec![format!(
        "between {} and {} characters",
        req.min_length, req.max_length
    )];
    if req.require_uppercase {
        rules.push("an uppercase letter".to_string());
    }
    if req.require_lowercase {
        rules.push("a lowercase letter".to_string());
    }
    if req.require_digit {
        rules.push("a digit".to_string());
    }
    if req.require_special {
        rules.push("a special character".to_string());
    }
    format!("Password must contain {}", rules.join(", "))
}

/// Transient tokens are 64 lowercase hex characters
pub fn validate_transient_token(token: &str) -> ValidationResult<&str> {
    let well_formed = token.len() == TRANSIENT_TOKEN_LENGTH
        && token.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if well_formed {
        Ok(token)
    } else {
        Err(ValidationError::InvalidTokenFormat)
    }
}
