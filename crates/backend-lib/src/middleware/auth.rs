use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::error::{AuthError, TokenError};
use crate::AppState;

/// Require `Authorization: Bearer <access token>`
///
/// The verified [`crate::auth::AccessClaims`] are stored in the request extensions.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(TokenError::Malformed)?;

    let claims = state.core.signer.verify_access(token)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
