// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Coarse error taxonomy shared by every component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationFailure,
    AuthenticationFailure,
    ExpiredToken,
    RevokedOrDisabled,
    RateLimited,
    ConfigurationFailure,
    InternalCryptoFailure,
    /// A collaborator (store, mailer) failed
    Collaborator,
    NotFound,
}

/// Reasons a signed access or refresh token is rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is malformed")]
    Malformed,
}

/// Reasons an API key is rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyError {
    #[error("invalid API key")]
    InvalidKey,

    #[error("API key has expired")]
    KeyExpired,

    #[error("API key has been revoked")]
    KeyRevoked,

    #[error("IP address not allowed")]
    IpNotAllowed,
}

/// Failure reported by a credential store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("credential already exists: {0}")]
    Conflict(String),

    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a mailer
#[derive(Error, Debug)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Invalid token: {0}")]
    Token(#[from] TokenError),

    #[error("Invalid refresh token: {0}")]
    InvalidRefreshToken(TokenError),

    #[error("Refresh token was already rotated")]
    RefreshTokenReused,

    #[error("Invalid or already used token")]
    InvalidTransientToken,

    #[error("Token has expired")]
    TransientTokenExpired,

    #[error("API key rejected: {0}")]
    ApiKey(#[from] ApiKeyError),

    #[error("Rate limit exceeded: maximum {max} requests per {window_secs} seconds")]
    RateLimited { max: u32, window_secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

impl AuthError {
    /// Map onto the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) | AuthError::EmailTaken => ErrorKind::ValidationFailure,
            AuthError::InvalidCredentials
            | AuthError::RefreshTokenReused
            | AuthError::InvalidTransientToken
            | AuthError::ApiKey(ApiKeyError::InvalidKey | ApiKeyError::IpNotAllowed) => {
                ErrorKind::AuthenticationFailure
            },
            AuthError::Token(e) | AuthError::InvalidRefreshToken(e) => match e {
                TokenError::Expired | TokenError::NotYetValid => ErrorKind::ExpiredToken,
                TokenError::InvalidSignature | TokenError::Malformed => {
                    ErrorKind::AuthenticationFailure
                },
            },
            AuthError::TransientTokenExpired | AuthError::ApiKey(ApiKeyError::KeyExpired) => {
                ErrorKind::ExpiredToken
            },
            AuthError::AccountDisabled | AuthError::ApiKey(ApiKeyError::KeyRevoked) => {
                ErrorKind::RevokedOrDisabled
            },
            AuthError::RateLimited { .. } => ErrorKind::RateLimited,
            AuthError::Configuration(_) => ErrorKind::ConfigurationFailure,
            AuthError::Crypto(_) => ErrorKind::InternalCryptoFailure,
            AuthError::Store(_) | AuthError::Mail(_) => ErrorKind::Collaborator,
            AuthError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ApiKey(ApiKeyError::IpNotAllowed) | AuthError::AccountDisabled => {
                StatusCode::FORBIDDEN
            },
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            AuthError::InvalidTransientToken | AuthError::TransientTokenExpired => {
                StatusCode::BAD_REQUEST
            },
            _ => match self.kind() {
                ErrorKind::ValidationFailure => StatusCode::BAD_REQUEST,
                ErrorKind::AuthenticationFailure
                | ErrorKind::ExpiredToken
                | ErrorKind::RevokedOrDisabled => StatusCode::UNAUTHORIZED,
                ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Collaborator => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::ConfigurationFailure | ErrorKind::InternalCryptoFailure => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VAL_001",
            AuthError::EmailTaken => "VAL_002",
            AuthError::InvalidCredentials => "AUTH_001",
            AuthError::AccountDisabled => "AUTH_002",
            AuthError::Token(TokenError::Expired) => "TOKEN_001",
            AuthError::Token(TokenError::NotYetValid) => "TOKEN_002",
            AuthError::Token(_) => "TOKEN_003",
            AuthError::InvalidRefreshToken(_) => "TOKEN_004",
            AuthError::RefreshTokenReused => "TOKEN_005",
            AuthError::InvalidTransientToken => "TOKEN_006",
            AuthError::TransientTokenExpired => "TOKEN_007",
            AuthError::ApiKey(ApiKeyError::InvalidKey) => "KEY_001",
            AuthError::ApiKey(ApiKeyError::KeyExpired) => "KEY_002",
            AuthError::ApiKey(ApiKeyError::KeyRevoked) => "KEY_003",
            AuthError::ApiKey(ApiKeyError::IpNotAllowed) => "KEY_004",
            AuthError::RateLimited { .. } => "RATE_001",
            AuthError::NotFound(_) => "NF_001",
            AuthError::Configuration(_) => "CFG_001",
            AuthError::Crypto(_) => "INT_001",
            AuthError::Store(_) => "STORE_001",
            AuthError::Mail(_) => "MAIL_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AuthError::Validation(msg) => msg.clone(),
            AuthError::EmailTaken => "Email already registered".to_string(),
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::AccountDisabled => "Account is disabled".to_string(),
            AuthError::Token(TokenError::Expired) => "Token has expired".to_string(),
            AuthError::Token(_) => "Invalid token".to_string(),
            AuthError::InvalidRefreshToken(_) | AuthError::RefreshTokenReused => {
                "Invalid refresh token".to_string()
            },
            AuthError::InvalidTransientToken => "Invalid or already used token".to_string(),
            AuthError::TransientTokenExpired => "Token has expired".to_string(),
            AuthError::ApiKey(e) => e.to_string(),
            AuthError::RateLimited { max, window_secs } => format!(
                "Rate limit exceeded for this endpoint. Maximum {max} requests per {window_secs} seconds."
            ),
            AuthError::NotFound(_) => "Resource not found".to_string(),
            AuthError::Configuration(_) | AuthError::Crypto(_) => {
                "An internal server error occurred".to_string()
            },
            AuthError::Store(_) | AuthError::Mail(_) => {
                "Service temporarily unavailable".to_string()
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "request failed");
        } else {
            tracing::debug!(code = error_code, error = %self, "request rejected");
        }

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
