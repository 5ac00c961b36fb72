use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Header carrying the signed-in user's email, set by the identity gateway.
/// Clients can send it too, so it is only honoured for limiters built with
/// `RateLimiter::per_user(true)`.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Picks the identifier a request is counted against.
///
/// Per-user limiters count the gateway-authenticated user when there is one;
/// everything else is counted per client IP.
pub fn client_identifier(headers: &HeaderMap, peer: Option<SocketAddr>, per_user: bool) -> String {
    if per_user {
        if let Some(email) = header_str(headers, USER_EMAIL_HEADER) {
            return format!("user:{}", email.to_ascii_lowercase());
        }
    }

    match client_ip(headers, peer) {
        Some(ip) => format!("ip:{ip}"),
        None => "ip:unknown".to_string(),
    }
}

/// First hop of `x-forwarded-for`, then `x-real-ip`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    forwarded
        .or_else(|| header_str(headers, "x-real-ip").and_then(|v| v.parse().ok()))
        .or_else(|| peer.map(|addr| addr.ip()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
