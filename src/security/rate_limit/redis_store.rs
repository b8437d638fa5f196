//! Redis-backed counter store for limits shared across instances.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use super::store::{CounterStore, StoreError, WindowHit, WindowRequest};

/// Sliding window check-and-increment, atomic on the server.
///
/// KEYS: current window, previous window.
/// ARGV: limit units, cost, window ms, elapsed ms into the current window.
/// Returns `{allowed, used_units}`.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local limit = tonumber(ARGV[1])
local cost = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local elapsed = tonumber(ARGV[4])

local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local previous = tonumber(redis.call('GET', KEYS[2]) or '0')
local used = math.floor(previous * (window - elapsed) / window) + current

if used + cost > limit then
    return {0, used}
end

local updated = redis.call('INCRBY', KEYS[1], cost)
if updated == cost then
    redis.call('PEXPIRE', KEYS[1], window * 2 + 1000)
end
return {1, used + cost}
"#;

/// Redis/Dragonfly store.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    script: redis::Script,
}

impl RedisStore {
    /// Connect and verify the server answers.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut connection = ConnectionManager::new(client).await?;

        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await?;

        debug!("Connected to Redis for rate limiting");

        Ok(Self {
            connection,
            script: redis::Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn hit(&self, request: &WindowRequest) -> Result<WindowHit, StoreError> {
        let index = request.window_index();
        let current_key = format!("{}:{}", request.key, index);
        let previous_key = format!("{}:{}", request.key, index - 1);
        let elapsed = request.now_ms.rem_euclid(request.window_ms);

        let mut connection = self.connection.clone();
        let reply: Vec<i64> = self
            .script
            .key(&current_key)
            .key(&previous_key)
            .arg(request.limit_units)
            .arg(request.cost)
            .arg(request.window_ms)
            .arg(elapsed)
            .invoke_async(&mut connection)
            .await?;

        match reply.as_slice() {
            [allowed, used] => Ok(WindowHit {
                allowed: *allowed == 1,
                used_units: (*used).max(0) as u64,
                reset_at_ms: request.reset_at_ms(),
            }),
            other => {
                warn!(reply = ?other, "Malformed sliding window reply");
                Err(StoreError::Protocol(format!("{other:?}")))
            }
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
