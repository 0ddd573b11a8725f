//! Client address resolution for per-IP rate limits
//!
//! Forwarding headers are honoured only when the TCP peer is one of the
//! configured trusted proxies. The client is the rightmost forwarded
//! address that is not itself a trusted proxy; entries further left were
//! written by the client and can be forged.

use axum::http::{header, HeaderMap};
use std::net::{IpAddr, Ipv4Addr};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Address to key per-client limits on
///
/// `peer` is the socket address of the connection; when it is unknown
/// (in-process requests) loopback is assumed.
pub fn client_ip(peer: Option<IpAddr>, headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> IpAddr {
    let direct = peer.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    if !trusted_proxies.contains(&direct) {
        return direct;
    }

    forwarded_chain(headers)
        .into_iter()
        .rev()
        .find(|ip| !trusted_proxies.contains(ip))
        .unwrap_or(direct)
}

/// Forwarded addresses, client first; `X-Forwarded-For` wins over `Forwarded`
fn forwarded_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    let xff: Vec<IpAddr> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if !xff.is_empty() {
        return xff;
    }

    // RFC 7239: Forwarded: for=192.0.2.60;proto=http, for="[2001:db8::1]:4711"
    headers
        .get_all(header::FORWARDED)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|element| {
            element.split(';').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                if key.trim().eq_ignore_ascii_case("for") {
                    parse_node(value.trim())
                } else {
                    None
                }
            })
        })
        .collect()
}

/// `192.0.2.1`, `192.0.2.1:8080`, `"[2001:db8::1]:4711"`; obfuscated
/// identifiers and `unknown` yield `None`
fn parse_node(value: &str) -> Option<IpAddr> {
    let value = value.trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = value.parse() {
        return Some(ip);
    }
    let (host, _port) = value.rsplit_once(':')?;
    host.parse().ok()
}
