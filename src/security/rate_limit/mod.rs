//! Multi-tier distributed rate limiting.
//!
//! # Data Flow
//! ```text
//! (identity, verified token, tier names)
//!     → composite.rs (fan out to every named tier concurrently)
//!     → tier.rs (derive key, weighted sliding-window check)
//!     → store.rs / redis_store.rs (atomic check-and-increment)
//!     → role.rs (scale raw limit/remaining by caller role)
//!     → composite.rs (most restrictive outcome wins)
//! ```
//!
//! # Design Decisions
//! - Fail open per tier: a store error skips that tier, never the request
//! - Role scaling is enforced through weighted request cost, reported post-hoc
//! - The in-process store is per instance; Redis is required for a global view

use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;

pub mod composite;
pub mod redis_store;
pub mod role;
pub mod store;
pub mod tier;

pub use composite::CompositeEvaluator;
pub use redis_store::RedisStore;
pub use role::RolePolicy;
pub use store::{CounterStore, InMemoryStore, StoreError};
pub use tier::RateLimitTier;

/// Result of checking one or more tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitOutcome {
    pub success: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at_ms: i64,
    pub restricted_by: Option<String>,
}

/// Millisecond wall clock, injectable for tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
