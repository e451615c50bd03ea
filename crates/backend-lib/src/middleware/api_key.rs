use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::client_ip;
use crate::error::{ApiKeyError, AuthError};
use crate::AppState;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests without a valid `X-API-Key`
///
/// The validated [`crate::auth::ApiKey`] is stored in the request extensions.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(ApiKeyError::InvalidKey)?
        .to_owned();
    let ip = client_ip(&state.core, &request);

    let record = state.core.api_keys.validate(&key, &ip)?;
    request.extensions_mut().insert(record);
    Ok(next.run(request).await)
}
