use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::RateCache;

struct CacheValue {
    value: String,
    expires_at: Instant,
}

/// In-memory cache implementation. Used by tests and as a stand-in when no
/// Redis is configured.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Mutex<HashMap<String, CacheValue>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let cache = self.inner.lock().await;
        if let Some(entry) = cache.get(key) {
            if entry.expires_at < Instant::now() {
                debug!(key, "Cache entry expired");
                return None;
            }
            debug!(key, "Cache HIT");
            return Some(entry.value.clone());
        }
        debug!(key, "Cache MISS");
        None
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) {
        let entry = CacheValue {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        let mut cache = self.inner.lock().await;
        debug!(key, "Cache PUT");
        cache.insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_cache_get_put() {
        let cache = MemoryCache::new();

        // Initially, cache is empty
        assert!(cache.get("key1").await.is_none());

        cache.put("key1", "123", Duration::from_secs(60)).await;
        assert_eq!(cache.get("key1").await, Some("123".to_string()));

        // Get a non-existent key
        assert!(cache.get("key2").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_ttl_expiration() {
        let cache = MemoryCache::new();

        cache.put("key1", "123", Duration::from_millis(10)).await;
        assert_eq!(cache.get("key1").await, Some("123".to_string()));

        // Wait for TTL expiration
        sleep(Duration::from_millis(20)).await;
        assert!(cache.get("key1").await.is_none());
    }
}
