//! Redis-backed [`Store`].
//!
//! Redis key patterns written through this backend:
//! - `ratelimit:{bucket}:{client}[:{route}]`: sorted set of request ids scored by arrival ms
//! - `lockout:{kind}:fail:{identifier}`: failure counter (INCR)
//! - `lockout:{kind}:lock:{identifier}`: lock flag (presence only)
//! - `session:{id}`: session record, value is the user identifier
//!
//! One multiplexed connection is opened at startup and cloned per call, so
//! concurrent requests pipeline over the same socket instead of reconnecting.

use super::{Store, StoreError, WindowSnapshot};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

/// Prune, count, conditionally insert, refresh TTL and read the oldest score
/// in a single server-side step.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_start = tonumber(ARGV[2])
local max_requests = tonumber(ARGV[3])
local window_secs = tonumber(ARGV[4])
local request_id = ARGV[5]

redis.call("ZREMRANGEBYSCORE", key, 0, window_start)
local count = redis.call("ZCARD", key)

local allowed = 0
if count < max_requests then
  redis.call("ZADD", key, now, request_id)
  allowed = 1
  count = count + 1
end

redis.call("EXPIRE", key, window_secs + 1)

local oldest = redis.call("ZRANGE", key, 0, 0, "WITHSCORES")
local oldest_ts = 0
if oldest and oldest[2] then
  oldest_ts = tonumber(oldest[2])
end

return { allowed, count, oldest_ts }
"#;

/// INCR, then EXPIRE only when the counter was just created.
const COUNTER_SCRIPT: &str = r#"
local n = redis.call("INCR", KEYS[1])
if n == 1 then
  redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return n
"#;

#[derive(Clone)]
pub struct RedisStore {
    con: MultiplexedConnection,
    script: redis::Script,
    counter_script: redis::Script,
    timeout: Duration,
}

impl RedisStore {
    /// Open the shared multiplexed connection.
    pub async fn connect(client: &redis::Client, timeout: Duration) -> Result<Self, StoreError> {
        let con = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout(timeout.as_millis() as u64))??;
        Ok(Self::from_connection(con, timeout))
    }

    pub fn from_connection(con: MultiplexedConnection, timeout: Duration) -> Self {
        Self {
            con,
            script: redis::Script::new(SLIDING_WINDOW_SCRIPT),
            counter_script: redis::Script::new(COUNTER_SCRIPT),
            timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn slide_window(
        &self,
        key: &str,
        now_ms: i64,
        window_start_ms: i64,
        max: u64,
        window_secs: u64,
        request_id: &str,
    ) -> Result<WindowSnapshot, StoreError> {
        let mut con = self.con.clone();
        let mut invocation = self.script.key(key);
        invocation
            .arg(now_ms)
            .arg(window_start_ms)
            .arg(max)
            .arg(window_secs)
            .arg(request_id);

        let (allowed, count, oldest): (i64, i64, i64) =
            self.bounded(invocation.invoke_async(&mut con)).await?;

        if count < 0 {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("negative cardinality {}", count),
            });
        }

        Ok(WindowSnapshot {
            allowed: allowed == 1,
            count: count as u64,
            oldest_ms: (oldest > 0).then_some(oldest),
        })
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut con = self.con.clone();
        self.bounded(con.incr(key, 1)).await
    }

    async fn incr_with_ttl(&self, key: &str, secs: u64) -> Result<i64, StoreError> {
        let mut con = self.con.clone();
        let mut invocation = self.counter_script.key(key);
        invocation.arg(secs);
        self.bounded(invocation.invoke_async(&mut con)).await
    }

    async fn expire(&self, key: &str, secs: u64) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        self.bounded(con.expire::<_, ()>(key, secs as i64)).await
    }

    async fn set_ex(&self, key: &str, value: &str, secs: u64) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        self.bounded(con.set_ex::<_, _, ()>(key, value, secs)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.con.clone();
        self.bounded(con.get(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        self.bounded(con.exists(key)).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut con = self.con.clone();
        // -2: missing key, -1: no expiry
        let secs: i64 = self.bounded(con.ttl(key)).await?;
        Ok((secs >= 0).then_some(secs as u64))
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        let deleted: i64 = self.bounded(con.del(key)).await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: String = self
            .bounded(redis::cmd("PING").query_async(&mut con))
            .await?;
        Ok(())
    }
}
