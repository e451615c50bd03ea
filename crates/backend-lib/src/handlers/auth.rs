// ============================
// crates/backend-lib/src/handlers/auth.rs
// ============================
//! Account and token endpoints.
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use keyward_common::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse,
    RefreshRequest, RegisterRequest, ResendVerificationRequest, ResetPasswordRequest, TokenPair,
    UserView, VerifyEmailQuery,
};
use serde_json::{json, Value};

use crate::auth::AccessClaims;
use crate::error::AuthError;
use crate::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserView>), AuthError> {
    let user = state.accounts.register(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.accounts.verify_email(&query.token).await?;
    Ok(Json(MessageResponse::new("Email verified")))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.accounts.resend_verification(&req.email).await?;
    Ok(Json(MessageResponse::new(
        "If the account exists and is unverified, a new verification link has been sent",
    )))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    Ok(Json(state.accounts.login(req).await?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    Ok(Json(state.accounts.refresh(&req.refresh_token).await?))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.accounts.forgot_password(&req.email).await?;
    Ok(Json(MessageResponse::new(
        "If the account exists, a password reset link has been sent",
    )))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.accounts.reset_password(req).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// The signed-in user
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<Json<UserView>, AuthError> {
    Ok(Json(state.accounts.get_user(&claims.sub).await?))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.accounts.change_password(&claims.sub, req).await?;
    Ok(Json(MessageResponse::new("Password updated")))
}
