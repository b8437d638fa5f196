//! Client address resolution from proxy headers.
//!
//! # Responsibilities
//! - Pick the caller address from forwarding headers in fixed priority order
//! - Reject anything that is not a bare IPv4 or IPv6 literal
//! - Build the per-tier counting key (user, ip or mixed)
//!
//! # Design Decisions
//! - Invalid candidates fall through to the next header instead of failing
//! - Unresolvable callers share the `"unknown"` bucket; they are still limited

use std::fmt;
use std::net::Ipv6Addr;

use axum::http::HeaderMap;

use crate::config::KeyMode;

/// Sentinel for callers without a valid address.
pub const UNKNOWN_IP: &str = "unknown";

/// Headers consulted, highest priority first.
pub const CLIENT_IP_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "cf-connecting-ip",
];

/// The resolved network identity of a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    ip: String,
    source: &'static str,
}

impl ClientIdentity {
    /// Resolve from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        for name in CLIENT_IP_HEADERS {
            let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
                continue;
            };

            // Only the left-most hop is the original client.
            let candidate = if name == "x-forwarded-for" {
                value.split(',').next().unwrap_or_default()
            } else {
                value
            };
            let candidate = candidate.trim();

            if is_valid_ip(candidate) {
                return Self {
                    ip: candidate.to_string(),
                    source: name,
                };
            }
        }

        Self::unknown()
    }

    /// The identity used when no header yields a valid address.
    pub fn unknown() -> Self {
        Self {
            ip: UNKNOWN_IP.to_string(),
            source: "none",
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Header the address was taken from, or `"none"`.
    pub fn raw_header_source(&self) -> &'static str {
        self.source
    }

    pub fn is_unknown(&self) -> bool {
        self.ip == UNKNOWN_IP
    }
}

/// Strict dotted-quad check: four decimal octets, 0-255, nothing else.
pub fn is_valid_ipv4(candidate: &str) -> bool {
    let mut octets = 0;
    for part in candidate.split('.') {
        octets += 1;
        if octets > 4 || part.is_empty() || part.len() > 3 {
            return false;
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match part.parse::<u16>() {
            Ok(n) if n <= 255 => {}
            _ => return false,
        }
    }
    octets == 4
}

/// Bare IPv6 literal. Brackets, ports and zone ids are rejected.
pub fn is_valid_ipv6(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.parse::<Ipv6Addr>().is_ok()
}

pub fn is_valid_ip(candidate: &str) -> bool {
    is_valid_ipv4(candidate) || is_valid_ipv6(candidate)
}

/// Identifies one counting bucket within a tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Derive the key for `mode`.
    pub fn derive(user_id: Option<&str>, identity: &ClientIdentity, mode: KeyMode) -> Self {
        let user_id = user_id.filter(|id| !id.is_empty());
        let key = match (mode, user_id) {
            (KeyMode::Ip, _) => format!("ip:{}", identity.ip()),
            (KeyMode::User, Some(id)) | (KeyMode::Mixed, Some(id)) => format!("user:{id}"),
            (KeyMode::User, None) => "user:anonymous".to_string(),
            (KeyMode::Mixed, None) => format!("ip:{}", identity.ip()),
        };
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_well_formed_literals_returned_verbatim() {
        for ip in ["203.0.113.7", "0.0.0.0", "255.255.255.255", "2001:db8::1", "::1", "fe80::1:2"] {
            let mut map = HeaderMap::new();
            map.insert("x-real-ip", HeaderValue::from_str(ip).unwrap());
            assert_eq!(ClientIdentity::from_headers(&map).ip(), ip);
        }
    }

    #[test]
    fn test_forwarded_for_uses_first_entry() {
        let id = ClientIdentity::from_headers(&headers(&[(
            "x-forwarded-for",
            "198.51.100.4, 10.0.0.1, 10.0.0.2",
        )]));
        assert_eq!(id.ip(), "198.51.100.4");
        assert_eq!(id.raw_header_source(), "x-forwarded-for");
    }

    #[test]
    fn test_priority_order() {
        let id = ClientIdentity::from_headers(&headers(&[
            ("cf-connecting-ip", "192.0.2.4"),
            ("x-client-ip", "192.0.2.3"),
            ("x-real-ip", "192.0.2.2"),
        ]));
        assert_eq!(id.ip(), "192.0.2.2");
        assert_eq!(id.raw_header_source(), "x-real-ip");
    }

    #[test]
    fn test_invalid_candidate_falls_through() {
        let id = ClientIdentity::from_headers(&headers(&[
            ("x-forwarded-for", "not-an-ip, 10.0.0.1"),
            ("x-real-ip", "256.1.1.1"),
            ("cf-connecting-ip", "192.0.2.9"),
        ]));
        assert_eq!(id.ip(), "192.0.2.9");
        assert_eq!(id.raw_header_source(), "cf-connecting-ip");
    }

    #[test]
    fn test_malformed_everywhere_is_unknown() {
        let bad = [
            "", " ", "1.2.3", "1.2.3.4.5", "01.2.3.4x", "1.2.3.-4", "[::1]", "::1%eth0",
            "1.2.3.4:80", "localhost", "1..2.3", "1.2.3.4 extra", "1.2.3.1000",
        ];
        for value in bad {
            let mut map = HeaderMap::new();
            for name in CLIENT_IP_HEADERS {
                map.insert(name, HeaderValue::from_str(value).unwrap());
            }
            let id = ClientIdentity::from_headers(&map);
            assert!(id.is_unknown(), "{value:?} should not resolve");
            assert_eq!(id.raw_header_source(), "none");
        }
        assert!(ClientIdentity::from_headers(&HeaderMap::new()).is_unknown());
    }

    #[test]
    fn test_key_modes() {
        let id = ClientIdentity::from_headers(&headers(&[("x-real-ip", "192.0.2.1")]));

        assert_eq!(RateLimitKey::derive(Some("u1"), &id, KeyMode::Mixed).as_str(), "user:u1");
        assert_eq!(RateLimitKey::derive(None, &id, KeyMode::Mixed).as_str(), "ip:192.0.2.1");
        assert_eq!(RateLimitKey::derive(Some("u1"), &id, KeyMode::Ip).as_str(), "ip:192.0.2.1");
        assert_eq!(RateLimitKey::derive(Some("u1"), &id, KeyMode::User).as_str(), "user:u1");
        assert_eq!(RateLimitKey::derive(None, &id, KeyMode::User).as_str(), "user:anonymous");

        let unknown = ClientIdentity::unknown();
        assert_eq!(RateLimitKey::derive(None, &unknown, KeyMode::Mixed).as_str(), "ip:unknown");
    }
}
