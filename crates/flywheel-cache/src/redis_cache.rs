//! Redis-backed fast cache, using `redis::aio::ConnectionManager` — a
//! cloneable, auto-reconnecting handle rather than a single
//! `Connection` behind a mutex.

use chrono::Duration;
use redis::{aio::ConnectionManager, AsyncCommands};

use flywheel_core::{Error, Result};

use crate::FastCache;

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(Error::from)?;
        let conn = client.get_connection_manager().await.map_err(Error::from)?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl FastCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(Error::from)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.num_seconds().max(1) as u64;
        conn.set_ex::<_, _, ()>(key, value, seconds).await.map_err(Error::from)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(Error::from)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor = 0u64;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(Error::from)?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> = conn.mget(&keys).await.map_err(Error::from)?;
        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }
}
