use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use super::client_ip;
use crate::auth::endpoint_id;
use crate::error::AuthError;
use crate::AppState;

/// Rate limiter middleware
///
/// Keys on the matched route template, so `/users/:id` shares one counter.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let limiter = &state.core.rate_limiter;
    if !limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);
    let endpoint = endpoint_id(request.method().as_str(), path);
    let ip = client_ip(&state.core, &request);

    limiter.check(&endpoint, &ip)?;
    Ok(next.run(request).await)
}
