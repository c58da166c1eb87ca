mod admin;
mod download;
mod dto;
mod public;
mod publish;
mod response;
mod router;
mod upload;

pub use router::{AppState, create_router};

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Derives the audit/webhook agent identifier for a request, in the form
/// `hostname-clientIP`. The client IP honors `X-Forwarded-For` (first
/// hop), then `X-Real-IP`, then the peer address.
pub fn agent_id_from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let client_ip = client_ip(headers, peer).unwrap_or_else(|| "unknown".to_string());
    format!("{}-{}", server_hostname(), client_ip)
}

fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let ip = first.trim();
            if ip.parse::<std::net::IpAddr>().is_ok() {
                return Some(ip.to_string());
            }
        }
    }

    if let Some(xri) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let ip = xri.trim();
        if ip.parse::<std::net::IpAddr>().is_ok() {
            return Some(ip.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}

fn server_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    if let Ok(name) = std::fs::read_to_string("/etc/hostname") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    "unknown".to_string()
}
