//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Pick the output format for the environment
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - JSON lines in production-like environments, human format elsewhere

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Environment;

/// Failed to install the global subscriber (usually: one is already set).
#[derive(Debug, thiserror::Error)]
#[error("failed to initialize logging: {0}")]
pub struct LoggingError(String);

/// Build the filter from `RUST_LOG`, falling back to `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("edge_gatekeeper={level},tower_http={level},warn")))
}

/// Install the global subscriber.
pub fn init_logging(level: &str, environment: Environment) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(env_filter(level));

    if environment.is_production_like() {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init()
            .map_err(|e| LoggingError(e.to_string()))
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| LoggingError(e.to_string()))
    }
}
