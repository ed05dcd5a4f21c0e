//! Fast cache gateway: short-lived derived values — fingerprints,
//! correlation edges, cluster membership snapshots — kept out of the
//! metadata store so hot reads don't hit Postgres.

mod memory;
mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use chrono::Duration;
use flywheel_core::Result;

#[async_trait]
pub trait FastCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;

    /// Lists all non-expired entries whose key starts with `prefix`. Used
    /// by the cluster detector to rebuild the correlation graph from the
    /// edges the correlation engine cached — there is no separate
    /// durable edge store.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}
