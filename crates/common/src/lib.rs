// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! exchanged between Keyward clients and the server.
//! This module defines the JSON request and response bodies of the auth API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a credential
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Registered, email not yet verified
    Unverified,
    /// Email verified, may use the API
    Active,
    /// Disabled by an operator
    Blocked,
}

impl UserStatus {
    /// Whether the account passed email verification
    pub fn is_active(self) -> bool {
        self == UserStatus::Active
    }

    /// Whether the account has been disabled
    pub fn is_blocked(self) -> bool {
        self == UserStatus::Blocked
    }
}

/// Create a new account
/// # Fields
/// * `email` - Login email, must be unique
/// * `name` - Display name
/// * `password` - Plaintext password
/// * `confirm_password` - Must equal `password`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub confirm_password: String,
}

/// Exchange email and password for a token pair
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Exchange a refresh token for a new token pair
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Ask for a fresh verification mail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResendVerificationRequest {
    pub email: String,
}

/// Ask for a password reset mail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Set a new password using a reset token
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Change the password of the authenticated user
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Query string of the verification link
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerifyEmailQuery {
    pub token: String,
}

/// Access and refresh token issued together
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Public view of an account; never carries hashes or tokens
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Successful login
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserView,
}

/// Generic acknowledgement for flows that must not leak account existence
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
