// ============================
// crates/backend-lib/src/client_ip.rs
// ============================
//! Client identity for rate limiting and API-key allowlists.
//!
//! The socket peer is authoritative. Forwarding headers are read only when the
//! peer itself is a configured trusted proxy.
use std::net::IpAddr;

use axum::http::HeaderMap;
use ipnetwork::IpNetwork;

use crate::config::ClientIpSettings;
use crate::error::AuthError;

/// Identity used when no peer address is known
pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted: Vec<IpNetwork>,
}

impl ClientIpResolver {
    pub fn new(settings: &ClientIpSettings) -> Result<Self, AuthError> {
        let trusted = settings
            .trusted_proxies
            .iter()
            .map(|cidr| {
                cidr.parse::<IpNetwork>().map_err(|e| {
                    AuthError::Configuration(format!("invalid trusted proxy `{cidr}`: {e}"))
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { trusted })
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted.iter().any(|net| net.contains(ip))
    }

    /// Resolve the client address for a request
    pub fn resolve(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> String {
        let Some(peer) = peer else {
            return UNKNOWN_CLIENT.to_string();
        };
        if !self.is_trusted(peer) {
            return peer.to_string();
        }
        self.from_forwarded(headers)
            .or_else(|| header_ip(headers, X_REAL_IP))
            .unwrap_or(peer)
            .to_string()
    }

    /// Walk `X-Forwarded-For` right to left, skipping trusted hops
    fn from_forwarded(&self, headers: &HeaderMap) -> Option<IpAddr> {
        let chain = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
        let mut leftmost = None;
        for hop in chain.rsplit(',') {
            let ip = hop.trim().parse::<IpAddr>().ok()?;
            if !self.is_trusted(ip) {
                return Some(ip);
            }
            leftmost = Some(ip);
        }
        leftmost
    }
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
