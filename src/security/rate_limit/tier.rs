//! A single rate limit tier over a shared counter store.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{KeyMode, TierConfig};
use crate::security::client_ip::RateLimitKey;

use super::store::{CounterStore, StoreError, WindowRequest};
use super::Clock;

/// Units a request costs at multiplier 1.0. Divisible by the reciprocal of
/// every built-in multiplier so those roles get exactly `floor(limit × m)`.
pub const UNITS_PER_REQUEST: u64 = 60_000;

/// Units consumed by one request for a caller with multiplier `m`.
pub fn request_cost(multiplier: f64) -> u64 {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return u64::MAX;
    }
    let cost = (UNITS_PER_REQUEST as f64 / multiplier).ceil();
    if cost < 1.0 {
        1
    } else {
        // `as` saturates for values past u64::MAX.
        cost as u64
    }
}

/// Raw result of a tier check, before role scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierOutcome {
    pub success: bool,
    /// Configured `max_requests`.
    pub limit: u64,
    /// Window capacity left, in units.
    pub unused_units: u64,
    pub reset_at_ms: i64,
}

impl TierOutcome {
    /// Remaining whole requests at multiplier 1.0.
    pub fn raw_remaining(&self) -> u64 {
        self.unused_units / UNITS_PER_REQUEST
    }
}

/// One independently configured limiter (api, ai, files, ...).
pub struct RateLimitTier {
    name: String,
    window: Duration,
    max_requests: u64,
    key_mode: KeyMode,
    key_prefix: String,
    store_timeout: Duration,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimitTier {
    pub fn new(
        name: impl Into<String>,
        config: &TierConfig,
        key_prefix: impl Into<String>,
        store_timeout: Duration,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            key_mode: config.key_mode,
            key_prefix: key_prefix.into(),
            store_timeout,
            store,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    /// Check and count one request. Reports raw (unscaled) figures.
    pub async fn check(
        &self,
        key: &RateLimitKey,
        multiplier: f64,
    ) -> Result<TierOutcome, StoreError> {
        let window_ms = i64::try_from(self.window.as_millis())
            .unwrap_or(i64::MAX)
            .max(1);
        let limit_units = self.max_requests.saturating_mul(UNITS_PER_REQUEST);

        let request = WindowRequest {
            key: format!("{}:{}:{}", self.key_prefix, self.name, key),
            now_ms: self.clock.now_ms(),
            window_ms,
            limit_units,
            cost: request_cost(multiplier),
        };

        let hit = tokio::time::timeout(self.store_timeout, self.store.hit(&request))
            .await
            .map_err(|_| StoreError::Timeout(self.store_timeout))??;

        tracing::trace!(
            tier = %self.name,
            key = %key,
            backend = self.store.backend(),
            allowed = hit.allowed,
            used_units = hit.used_units,
            "Tier checked"
        );

        Ok(TierOutcome {
            success: hit.allowed,
            limit: self.max_requests,
            unused_units: limit_units.saturating_sub(hit.used_units),
            reset_at_ms: hit.reset_at_ms,
        })
    }
}
