//! Counter storage backends.
//!
//! Both backends implement the same sliding-window counter: two adjacent
//! fixed windows, with the previous window's total weighted by how much of
//! it still overlaps the sliding window. Check and increment happen as one
//! atomic step per key; rejected requests do not consume quota.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

/// Errors raised by a counter store round trip.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected counter store reply: {0}")]
    Protocol(String),
}

/// One check-and-increment against a sliding window.
#[derive(Debug, Clone)]
pub struct WindowRequest {
    /// Namespaced bucket key, without the window index.
    pub key: String,
    pub now_ms: i64,
    pub window_ms: i64,
    /// Capacity of the window in units.
    pub limit_units: u64,
    /// Units this request consumes.
    pub cost: u64,
}

impl WindowRequest {
    pub fn window_index(&self) -> i64 {
        self.now_ms.div_euclid(self.window_ms)
    }

    /// End of the current fixed window.
    pub fn reset_at_ms(&self) -> i64 {
        (self.window_index() + 1) * self.window_ms
    }

    /// Previous window total scaled by its remaining overlap.
    pub fn weighted(&self, previous: u64, current: u64) -> u64 {
        let elapsed = self.now_ms.rem_euclid(self.window_ms) as u128;
        let window = self.window_ms as u128;
        let carried = (previous as u128 * (window - elapsed)) / window;
        (carried as u64).saturating_add(current)
    }
}

/// Outcome of a window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub allowed: bool,
    /// Weighted units in use after this request.
    pub used_units: u64,
    pub reset_at_ms: i64,
}

/// Trait for rate limit counter backends.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically check the window and consume `cost` if it fits.
    async fn hit(&self, request: &WindowRequest) -> Result<WindowHit, StoreError>;

    /// Short backend name for logs and metrics.
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
struct WindowSlot {
    window_ms: i64,
    index: i64,
    current: u64,
    previous: u64,
}

impl WindowSlot {
    /// Roll the slot forward to `index`.
    fn roll(&mut self, index: i64) {
        if index == self.index {
            return;
        }
        self.previous = if index == self.index + 1 { self.current } else { 0 };
        self.current = 0;
        self.index = index;
    }
}

/// In-process store. Limits are enforced per instance only.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    slots: DashMap<String, WindowSlot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop slots that no longer influence any window at `now_ms`.
    pub fn purge_stale(&self, now_ms: i64) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now_ms.div_euclid(slot.window_ms) - slot.index <= 1);
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.slots.len(), "Purged stale rate limit windows");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn hit(&self, request: &WindowRequest) -> Result<WindowHit, StoreError> {
        let index = request.window_index();

        // The entry guard holds the shard lock for the whole check-and-increment.
        let mut slot = self
            .slots
            .entry(request.key.clone())
            .or_insert_with(|| WindowSlot {
                window_ms: request.window_ms,
                index,
                current: 0,
                previous: 0,
            });
        slot.window_ms = request.window_ms;
        slot.roll(index);

        let weighted = request.weighted(slot.previous, slot.current);
        if weighted.saturating_add(request.cost) > request.limit_units {
            return Ok(WindowHit {
                allowed: false,
                used_units: weighted,
                reset_at_ms: request.reset_at_ms(),
            });
        }

        slot.current = slot.current.saturating_add(request.cost);
        Ok(WindowHit {
            allowed: true,
            used_units: weighted + request.cost,
            reset_at_ms: request.reset_at_ms(),
        })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
