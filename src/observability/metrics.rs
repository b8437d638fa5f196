//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatekeeper_decisions_total` (counter): gate outcomes by decision
//! - `gatekeeper_rate_limited_total` (counter): 429s by restricting tier
//! - `gatekeeper_store_errors_total` (counter): failed-open tier checks
//! - `gatekeeper_auth_failures_total` (counter): 401s and login redirects
//! - `gatekeeper_decision_duration_seconds` (histogram): time spent in the gate
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const DECISIONS_TOTAL: &str = "gatekeeper_decisions_total";
pub const RATE_LIMITED_TOTAL: &str = "gatekeeper_rate_limited_total";
pub const STORE_ERRORS_TOTAL: &str = "gatekeeper_store_errors_total";
pub const AUTH_FAILURES_TOTAL: &str = "gatekeeper_auth_failures_total";
pub const DECISION_DURATION: &str = "gatekeeper_decision_duration_seconds";

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe() {
    describe_counter!(DECISIONS_TOTAL, "Gate decisions by outcome");
    describe_counter!(RATE_LIMITED_TOTAL, "Requests rejected by a rate limit tier");
    describe_counter!(
        STORE_ERRORS_TOTAL,
        "Tier checks skipped because the counter store failed"
    );
    describe_counter!(AUTH_FAILURES_TOTAL, "Requests denied for missing session");
    describe_histogram!(
        DECISION_DURATION,
        Unit::Seconds,
        "Time spent deciding a request"
    );
}

/// `decision` is one of `pass`, `redirect`, `reject`.
pub fn record_decision(decision: &'static str) {
    counter!(DECISIONS_TOTAL, "decision" => decision).increment(1);
}

pub fn record_rate_limited(tier: &str) {
    counter!(RATE_LIMITED_TOTAL, "tier" => tier.to_string()).increment(1);
}

pub fn record_store_error(tier: &str) {
    counter!(STORE_ERRORS_TOTAL, "tier" => tier.to_string()).increment(1);
}

/// `route` is `api` or `page`.
pub fn record_auth_failure(route: &'static str) {
    counter!(AUTH_FAILURES_TOTAL, "route" => route).increment(1);
}

pub fn record_decision_duration(start: Instant) {
    histogram!(DECISION_DURATION).record(start.elapsed().as_secs_f64());
}
