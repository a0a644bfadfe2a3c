//! The shared key/value store contract (§6 "L2 KV contract"): `GET`,
//! `SET` with expiry, `DEL`, `SCAN`, namespaced by a configurable prefix.

use async_trait::async_trait;
use helix_core::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[async_trait]
pub trait L2Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    /// Batched cursor scan over keys with `prefix`; returns up to `batch`
    /// matches plus a continuation cursor (`None` once exhausted).
    async fn scan_prefix(&self, prefix: &str, cursor: Option<String>, batch: usize) -> Result<(Vec<String>, Option<String>)>;
}

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: std::time::Instant,
}

/// An in-memory fake satisfying the [`L2Store`] contract, used in tests
/// and for local/offline development without a Redis deployment.
#[derive(Clone, Default)]
pub struct InMemoryL2 {
    inner: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl InMemoryL2 {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl L2Store for InMemoryL2 {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let map = self.inner.read().await;
        match map.get(key) {
            Some(v) if v.expires_at > std::time::Instant::now() => Ok(Some(v.bytes.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut map = self.inner.write().await;
        map.insert(key.to_string(), StoredValue { bytes: value, expires_at: std::time::Instant::now() + ttl });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.inner.write().await.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str, cursor: Option<String>, batch: usize) -> Result<(Vec<String>, Option<String>)> {
        let map = self.inner.read().await;
        let mut matching: Vec<&String> = map.keys().filter(|k| k.starts_with(prefix)).collect();
        matching.sort();
        let start = match cursor {
            Some(c) => matching.iter().position(|k| **k > c).unwrap_or(matching.len()),
            None => 0,
        };
        let page: Vec<String> = matching[start..].iter().take(batch).map(|k| (**k).clone()).collect();
        let next_cursor = if start + page.len() < matching.len() { page.last().cloned() } else { None };
        Ok((page, next_cursor))
    }
}

/// Redis-backed [`L2Store`], built on `fred` the way the teacher's memory
/// crate offers an optional `fred`-backed store (`redis-memory` feature).
#[cfg(feature = "redis-l2")]
pub struct RedisL2 {
    client: fred::clients::Client,
}

#[cfg(feature = "redis-l2")]
impl RedisL2 {
    pub async fn connect(config: fred::types::config::Config) -> Result<Self> {
        use fred::prelude::*;
        let client = fred::clients::Client::new(config, None, None, None);
        client.init().await.map_err(|e| helix_core::HelixError::CacheUnavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "redis-l2")]
#[async_trait]
impl L2Store for RedisL2 {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use fred::prelude::*;
        self.client.get::<Option<Vec<u8>>, _>(key).await.map_err(|e| helix_core::HelixError::CacheUnavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        use fred::prelude::*;
        self.client
            .set::<(), _, _>(key, value, Some(Expiration::PX(ttl.as_millis() as i64)), None, false)
            .await
            .map_err(|e| helix_core::HelixError::CacheUnavailable(e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<()> {
        use fred::prelude::*;
        self.client.del::<(), _>(key).await.map_err(|e| helix_core::HelixError::CacheUnavailable(e.to_string()))
    }

    async fn scan_prefix(&self, prefix: &str, cursor: Option<String>, batch: usize) -> Result<(Vec<String>, Option<String>)> {
        use fred::prelude::*;
        let pattern = format!("{prefix}*");
        let cursor_arg = cursor.unwrap_or_else(|| "0".to_string());
        let (next, keys): (String, Vec<String>) = self
            .client
            .scan_page(cursor_arg, Some(&pattern), Some(batch as u32), None)
            .await
            .map_err(|e| helix_core::HelixError::CacheUnavailable(e.to_string()))?;
        let next_cursor = if next == "0" { None } else { Some(next) };
        Ok((keys, next_cursor))
    }
}
