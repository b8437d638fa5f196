//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing tiers)
//! - Validate value ranges (windows > 0, multipliers positive)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatekeeperConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatekeeperConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatekeeperConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {}", config.observability.metrics_address),
        ));
    }

    if config.upstream.request_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.request_timeout_secs", "must be > 0"));
    }

    let auth = &config.auth;
    if auth.cookie_name.trim().is_empty() {
        errors.push(ValidationError::new("auth.cookie_name", "must not be empty"));
    }
    check_path(&mut errors, "auth.login_path", &auth.login_path);
    check_path(&mut errors, "auth.dashboard_path", &auth.dashboard_path);
    for path in &auth.sign_in_paths {
        check_path(&mut errors, "auth.sign_in_paths", path);
    }

    let routes = &config.routes;
    check_path(&mut errors, "routes.api_prefix", &routes.api_prefix);
    for path in routes
        .static_prefixes
        .iter()
        .chain(&routes.static_paths)
        .chain(&routes.static_asset_dirs)
        .chain(&routes.public_paths)
        .chain(&routes.public_prefixes)
    {
        check_path(&mut errors, "routes", path);
    }

    let rl = &config.rate_limit;
    if rl.store_timeout_ms == 0 {
        errors.push(ValidationError::new("rate_limit.store_timeout_ms", "must be > 0"));
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be > 0"));
    }
    if rl.outage.remaining > rl.outage.limit {
        errors.push(ValidationError::new(
            "rate_limit.outage.remaining",
            "must not exceed rate_limit.outage.limit",
        ));
    }

    for (name, tier) in &rl.tiers {
        if tier.window_secs == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.tiers.{name}.window_secs"),
                "must be > 0",
            ));
        }
        if tier.max_requests == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.tiers.{name}.max_requests"),
                "must be > 0",
            ));
        }
    }

    let referenced = rl
        .route_tiers
        .iter()
        .flat_map(|r| r.tiers.iter())
        .chain(rl.default_tiers.iter());
    for name in referenced {
        if !rl.tiers.contains_key(name) {
            errors.push(ValidationError::new(
                "rate_limit.route_tiers",
                format!("unknown tier '{name}'"),
            ));
        }
    }
    for route in &rl.route_tiers {
        check_path(&mut errors, "rate_limit.route_tiers.prefix", &route.prefix);
    }

    for (role, multiplier) in &rl.role_multipliers {
        if !multiplier.is_finite() || *multiplier <= 0.0 {
            errors.push(ValidationError::new(
                format!("rate_limit.role_multipliers.{role}"),
                "must be a positive number",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &str, path: &str) {
    if !path.starts_with('/') {
        errors.push(ValidationError::new(
            field,
            format!("path must start with '/': {path}"),
        ));
    }
}
