//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the counter store, falling back to the in-process store
//! - Build the gate and the HTTP server from a validated config
//!
//! # Design Decisions
//! - A missing or unreachable Redis never prevents startup
//! - Only the in-process store gets a sweeper

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{GatekeeperConfig, RateLimitConfig};
use crate::http::HttpServer;
use crate::security::rate_limit::{CounterStore, InMemoryStore, RedisStore};
use crate::security::Gatekeeper;

const STORE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The store the gate counts against.
pub struct StoreHandle {
    pub store: Arc<dyn CounterStore>,
    /// Set when counting in-process; needs periodic sweeping.
    pub local: Option<Arc<InMemoryStore>>,
}

impl StoreHandle {
    pub fn in_memory() -> Self {
        let local = Arc::new(InMemoryStore::new());
        Self {
            store: local.clone(),
            local: Some(local),
        }
    }
}

/// Connect to `store_url` when configured, else count in-process.
pub async fn connect_store(config: &RateLimitConfig) -> StoreHandle {
    let Some(url) = config.store_url.as_deref().filter(|u| !u.is_empty()) else {
        info!("No counter store configured; rate limits are per instance");
        return StoreHandle::in_memory();
    };

    match tokio::time::timeout(STORE_CONNECT_TIMEOUT, RedisStore::connect(url)).await {
        Ok(Ok(store)) => {
            info!("Rate limit counters shared through Redis");
            StoreHandle {
                store: Arc::new(store),
                local: None,
            }
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Redis unavailable; falling back to in-process rate limiting");
            StoreHandle::in_memory()
        }
        Err(_) => {
            warn!(
                timeout = ?STORE_CONNECT_TIMEOUT,
                "Redis connect timed out; falling back to in-process rate limiting"
            );
            StoreHandle::in_memory()
        }
    }
}

/// Build a ready-to-run server from a validated config.
pub async fn build_server(config: GatekeeperConfig) -> HttpServer {
    if config.auth.secret.is_none() {
        warn!("No session signing secret configured; every session check will fail");
    }

    let handle = connect_store(&config.rate_limit).await;
    let gate = Arc::new(Gatekeeper::from_config(&config, handle.store));

    let server = HttpServer::new(config, gate);
    match handle.local {
        Some(local) => server.with_sweeper(local),
        None => server,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_store_url_uses_memory() {
        let handle = connect_store(&RateLimitConfig::default()).await;
        assert_eq!(handle.store.backend(), "memory");
        assert!(handle.local.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back() {
        let config = RateLimitConfig {
            store_url: Some("redis://127.0.0.1:1/".to_string()),
            ..RateLimitConfig::default()
        };
        let handle = connect_store(&config).await;
        assert_eq!(handle.store.backend(), "memory");
    }
}
