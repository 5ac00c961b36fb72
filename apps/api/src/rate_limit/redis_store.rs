use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::RateLimitPolicy;
use crate::rate_limit::store::{RateLimitError, RateLimitStore, WindowSnapshot};

/// INCR the counter and start the window on the first hit, in one round trip.
/// A key that lost its TTL gets it back so it can never count forever.
const HIT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// Fixed windows kept in Redis so every replica sees the same counts.
/// Window expiry is Redis key expiry; there is nothing to purge locally.
pub struct RedisRateLimitStore {
    client: Client,
    connection: OnceCell<MultiplexedConnection>,
    script: Script,
}

impl RedisRateLimitStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            connection: OnceCell::new(),
            script: Script::new(HIT_SCRIPT),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, RateLimitError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let connection = self.client.get_multiplexed_async_connection().await?;
                info!("Redis rate limit store connected");
                Ok::<_, RateLimitError>(connection)
            })
            .await?;
        Ok(connection.clone())
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<WindowSnapshot, RateLimitError> {
        let mut connection = self.connection().await?;
        let window_ms = u64::try_from(policy.window.as_millis()).unwrap_or(u64::MAX);

        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut connection)
            .await?;

        snapshot_from_reply(count, ttl_ms)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

fn snapshot_from_reply(count: i64, ttl_ms: i64) -> Result<WindowSnapshot, RateLimitError> {
    let count = u32::try_from(count)
        .map_err(|_| RateLimitError::UnexpectedReply(format!("count {count}")))?;
    let ttl_ms = u64::try_from(ttl_ms)
        .map_err(|_| RateLimitError::UnexpectedReply(format!("ttl {ttl_ms}ms")))?;

    Ok(WindowSnapshot {
        count,
        reset_after: Duration::from_millis(ttl_ms),
    })
}
