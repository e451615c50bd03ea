// ============================
// keyward-lib/src/router.rs
// ============================
//! HTTP router.
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::auth;
use crate::middleware::{rate_limit, require_api_key, require_bearer};
use crate::AppState;

/// Create the API router
///
/// Every route except `/health` is rate limited; the API-key guard is added
/// when `api_keys.required` is set.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        .route_layer(from_fn_with_state(state.clone(), require_bearer));

    let mut api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-email", get(auth::verify_email))
        .route("/auth/resend-verification", post(auth::resend_verification))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .merge(protected);

    if state.core.require_api_key {
        api = api.route_layer(from_fn_with_state(state.clone(), require_api_key));
    }

    api.route_layer(from_fn_with_state(state.clone(), rate_limit))
        .route("/health", get(auth::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
