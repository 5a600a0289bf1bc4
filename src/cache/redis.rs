use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::RateCache;
use crate::config::RedisConfig;

/// Both the connection handshake and individual commands are bounded by
/// this timeout so an unreachable Redis cannot stall request handling.
const REDIS_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed cache. The connection is established lazily and re-dialed
/// after a command failure; every error is converted into a miss.
pub struct RedisCache {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisCache {
    pub fn new(config: &RedisConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.url())?;
        Ok(RedisCache {
            client,
            conn: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Option<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Some(conn.clone());
        }
        match self
            .client
            .get_multiplexed_async_connection_with_timeouts(REDIS_TIMEOUT, REDIS_TIMEOUT)
            .await
        {
            Ok(conn) => {
                debug!("Connected to redis");
                *guard = Some(conn.clone());
                Some(conn)
            }
            Err(err) => {
                debug!(error = %err, "Redis connection failed");
                None
            }
        }
    }

    /// Drops the cached connection so the next call re-dials.
    async fn invalidate(&self) {
        *self.conn.lock().await = None;
    }
}

#[async_trait]
impl RateCache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(value)) => {
                debug!(key, "Cache HIT");
                Some(value)
            }
            Ok(None) => {
                debug!(key, "Cache MISS");
                None
            }
            Err(err) => {
                debug!(key, error = %err, "Cache read failed");
                self.invalidate().await;
                None
            }
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        match conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
        {
            Ok(()) => debug!(key, "Cache PUT"),
            Err(err) => {
                debug!(key, error = %err, "Cache write failed");
                self.invalidate().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // An unreachable backend must behave like an always-empty cache.
    #[tokio::test]
    async fn test_unreachable_redis_is_a_miss() {
        let config = RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            db: 0,
        };
        let cache = RedisCache::new(&config).unwrap();

        assert!(cache.get("rates:RUB:latest").await.is_none());
        cache
            .put("rates:RUB:latest", "{}", Duration::from_secs(60))
            .await;
        assert!(cache.get("rates:RUB:latest").await.is_none());
    }
}
