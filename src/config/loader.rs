//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{Environment, GatekeeperConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Signing secret for session tokens.
pub const ENV_AUTH_SECRET: &str = "AUTH_SECRET";
/// Counter store connection string.
pub const ENV_REDIS_URL: &str = "REDIS_URL";
/// Deployment environment name.
pub const ENV_APP_ENV: &str = "APP_ENV";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load the optional file, overlay the process environment, then validate.
pub fn load(path: Option<&Path>) -> Result<GatekeeperConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatekeeperConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment values. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut GatekeeperConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(secret) = get(ENV_AUTH_SECRET) {
        config.auth.secret = Some(secret);
    }
    if let Some(url) = get(ENV_REDIS_URL) {
        config.rate_limit.store_url = Some(url);
    }
    if let Some(env) = get(ENV_APP_ENV) {
        config.environment = Environment::from_name(&env);
    }
}
