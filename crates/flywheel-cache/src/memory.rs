//! In-process fast cache: `DashMap` plus a stored expiry instant, checked
//! lazily on read (no background sweeper — the daily maintenance job
//! handles bulk expiry for the durable stores; this one is small enough
//! that lazy eviction is sufficient).

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use flywheel_core::Result;

use crate::FastCache;

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, DateTime<Utc>)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FastCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let (value, expires_at) = entry.value().clone();
        if expires_at <= Utc::now() {
            drop(entry);
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(value))
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.insert(key.to_string(), (value, Utc::now() + ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let now = Utc::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().1 > now)
            .map(|e| (e.key().clone(), e.value().0.clone()))
            .collect())
    }
}
