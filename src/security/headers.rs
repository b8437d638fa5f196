//! Response header sets produced by the gate.
//!
//! # Responsibilities
//! - Fixed security headers on every response (HSTS when production-like)
//! - CORS preflight headers
//! - Rate limit headers and `Retry-After`
//!
//! # Design Decisions
//! - Header maps are built fresh per decision; nothing is shared or mutated
//! - Absent rate limit fields are omitted rather than zeroed

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, SecondsFormat};

use crate::config::Environment;
use crate::security::rate_limit::RateLimitOutcome;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Headers every response carries.
pub fn security_headers(environment: Environment) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    if environment.is_production_like() {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS),
        );
    }
    headers
}

/// Fixed answer to a CORS preflight.
pub fn cors_preflight_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, PATCH, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    headers
}

/// `X-RateLimit-*` values; only present fields are emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_at_ms: Option<i64>,
}

impl From<&RateLimitOutcome> for RateLimitHeaders {
    fn from(outcome: &RateLimitOutcome) -> Self {
        Self {
            limit: Some(outcome.limit),
            remaining: Some(outcome.remaining),
            reset_at_ms: Some(outcome.reset_at_ms),
        }
    }
}

impl RateLimitHeaders {
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Some(limit) = self.limit {
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
        }
        if let Some(remaining) = self.remaining {
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
        }
        if let Some(reset) = self.reset_at_ms.and_then(format_reset) {
            if let Ok(value) = HeaderValue::from_str(&reset) {
                headers.insert(X_RATELIMIT_RESET, value);
            }
        }
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
pub fn format_reset(reset_at_ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(reset_at_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Whole seconds until reset, at least 1.
pub fn retry_after_secs(reset_at_ms: i64, now_ms: i64) -> u64 {
    let wait_ms = reset_at_ms.saturating_sub(now_ms).max(0) as u64;
    wait_ms.div_ceil(1000).max(1)
}

/// Insert every header of `extra` into `target`, replacing same-named ones.
pub fn merge(target: &mut HeaderMap, extra: &HeaderMap) {
    for (name, value) in extra {
        target.insert(name.clone(), value.clone());
    }
}
