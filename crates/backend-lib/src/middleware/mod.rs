// crates/backend-lib/src/middleware/mod.rs

//! Request guards: rate limiting, API keys and bearer tokens.

pub mod api_key;
pub mod auth;
pub mod rate_limit;

pub use api_key::{require_api_key, API_KEY_HEADER};
pub use auth::require_bearer;
pub use rate_limit::rate_limit;

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};

use crate::AuthCore;

/// Client identity for a request, honouring trusted proxies
pub fn client_ip(core: &AuthCore, request: &Request) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    core.client_ip.resolve(peer, request.headers())
}
