//! Short-lived cache for computed rate responses.
//!
//! The cache is a pure performance layer: every failure inside an
//! implementation is swallowed and reported as a miss (or a no-op on
//! write), so callers never branch on cache errors.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryCache;
pub use redis::RedisCache;

/// Entries expire after one hour.
pub const CACHE_TTL: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait RateCache: Send + Sync {
    /// Returns the cached payload, or `None` on a miss, an expired entry,
    /// or any backend failure.
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores a payload with the given expiry. Backend failures are logged
    /// and dropped.
    async fn put(&self, key: &str, value: &str, ttl: Duration);
}
