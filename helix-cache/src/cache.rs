//! Two-Tier Cache (§4.E): L1 in-process, size-bounded, TTL'd, fronting an
//! optional L2 shared KV store, with tag-based invalidation and gzip
//! compression over the wire to L2.

use crate::compression::{compress, decompress, is_gzip};
use crate::entry::CacheEntry;
use crate::l2::L2Store;
use crate::tag_index::TagIndex;
use helix_core::{HelixError, Result};
use helix_telemetry::{Component, EventOutcome, MetricsRegistry, ObservabilityEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub l1_max_size: usize,
    pub l1_ttl: Duration,
    pub l1_cleanup_interval: Duration,
    pub l2_ttl: Duration,
    pub l2_key_prefix: String,
    pub compression_enabled: bool,
    pub compression_min_bytes: usize,
    pub negative_ttl: Duration,
    pub enable_l1: bool,
    pub enable_l2: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_size: 10_000,
            l1_ttl: Duration::from_secs(5 * 60),
            l1_cleanup_interval: Duration::from_secs(60),
            l2_ttl: Duration::from_secs(60 * 60),
            l2_key_prefix: "helixagent:".to_string(),
            compression_enabled: true,
            compression_min_bytes: 100,
            negative_ttl: Duration::from_secs(30),
            enable_l1: true,
            enable_l2: true,
        }
    }
}

#[derive(Default)]
struct L1State {
    entries: HashMap<String, CacheEntry>,
    tags: TagIndex,
}

/// The combined L1/L2 cache. Cheaply cloneable — internally `Arc`-backed.
#[derive(Clone)]
pub struct Cache {
    config: CacheConfig,
    l1: Arc<RwLock<L1State>>,
    l2: Option<Arc<dyn L2Store>>,
    metrics: MetricsRegistry,
}

impl Cache {
    pub fn new(config: CacheConfig, l2: Option<Arc<dyn L2Store>>, metrics: MetricsRegistry) -> Self {
        Self { config, l1: Arc::new(RwLock::new(L1State::default())), l2, metrics }
    }

    fn l2_key(&self, key: &str) -> String {
        format!("{}{}", self.config.l2_key_prefix, key)
    }

    /// §4.E read path.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.config.enable_l1 {
            let state = self.l1.read().await;
            if let Some(entry) = state.entries.get(key) {
                let now = chrono::Utc::now();
                if !entry.is_expired(now) {
                    entry.record_hit();
                    self.metrics.incr("cache.l1.hit");
                    return Ok(Some(entry.value.clone()));
                }
            }
        }
        self.metrics.incr("cache.l1.miss");

        if !self.config.enable_l2 {
            return Ok(None);
        }
        let Some(l2) = &self.l2 else { return Ok(None) };

        match l2.get(&self.l2_key(key)).await {
            Ok(Some(raw)) => {
                self.metrics.incr("cache.l2.hit");
                let bytes = if is_gzip(&raw) { decompress(&raw)? } else { raw };
                // Promote to L1 with min(remaining_ttl, L1TTL). L2 doesn't
                // expose remaining TTL in this contract, so we promote at
                // L1TTL — acceptable since L2's own TTL still bounds staleness.
                self.insert_l1(key, bytes.clone(), self.config.l1_ttl, &[]).await;
                Ok(Some(bytes))
            }
            Ok(None) => {
                self.metrics.incr("cache.l2.miss");
                Ok(None)
            }
            Err(e) => {
                helix_telemetry::emit(
                    ObservabilityEvent::new(Component::Cache, EventOutcome::Degraded, 0).with_detail(e.to_string()),
                );
                Ok(None)
            }
        }
    }

    /// §4.E write path.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration, tags: Vec<String>) -> Result<()> {
        if self.config.enable_l1 {
            self.insert_l1(key, value.clone(), ttl.min(self.config.l1_ttl), &tags).await;
        }

        if self.config.enable_l2 {
            if let Some(l2) = &self.l2 {
                let wire = if self.config.compression_enabled && value.len() >= self.config.compression_min_bytes {
                    let before = value.len();
                    let compressed = compress(&value)?;
                    self.metrics.incr_by("cache.compression.bytes_saved", before.saturating_sub(compressed.len()) as u64);
                    compressed
                } else {
                    value
                };
                if let Err(e) = l2.set(&self.l2_key(key), wire, ttl).await {
                    return Err(HelixError::CacheUnavailable(e.to_string()));
                }
            }
        }
        Ok(())
    }

    async fn insert_l1(&self, key: &str, value: Vec<u8>, ttl: Duration, tags: &[String]) {
        let mut state = self.l1.write().await;
        if state.entries.len() >= self.config.l1_max_size && !state.entries.contains_key(key) {
            evict_one(&mut state);
        }
        let expires_at = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        state.tags.insert(key, tags);
        state.entries.insert(key.to_string(), CacheEntry::new(value, expires_at, tags.to_vec()));
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        {
            let mut state = self.l1.write().await;
            state.entries.remove(key);
            state.tags.remove_key(key);
        }
        if let Some(l2) = &self.l2 {
            l2.del(&self.l2_key(key)).await?;
        }
        Ok(())
    }

    pub async fn invalidate_by_tag(&self, tag: &str) -> Result<()> {
        let keys = {
            let state = self.l1.read().await;
            state.tags.keys_for_tag(tag)
        };
        for key in &keys {
            self.delete(key).await?;
        }
        self.l1.write().await.tags.remove_tag(tag);
        Ok(())
    }

    pub async fn invalidate_by_tags(&self, tags: &[String]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for tag in tags {
            let keys = {
                let state = self.l1.read().await;
                state.tags.keys_for_tag(tag)
            };
            for key in keys {
                if seen.insert(key.clone()) {
                    self.delete(&key).await?;
                }
            }
            self.l1.write().await.tags.remove_tag(tag);
        }
        Ok(())
    }

    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<()> {
        let l1_matches: Vec<String> = {
            let state = self.l1.read().await;
            state.entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect()
        };
        for key in l1_matches {
            self.delete(&key).await?;
        }

        if let Some(l2) = &self.l2 {
            let mut cursor = None;
            loop {
                let (page, next) = l2.scan_prefix(&self.l2_key(prefix), cursor, 100).await?;
                for key in page {
                    l2.del(&key).await?;
                }
                match next {
                    Some(c) => cursor = Some(c),
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// Background sweep (§4.E: "every `L1CleanupInterval`, take the write
    /// lock, delete all entries with `expiry ≤ now`").
    pub async fn start_cleanup_loop(self: Arc<Self>, mut stop: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.l1_cleanup_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_expired().await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn sweep_expired(&self) {
        let now = chrono::Utc::now();
        let mut state = self.l1.write().await;
        let expired: Vec<String> =
            state.entries.iter().filter(|(_, e)| e.is_expired(now)).map(|(k, _)| k.clone()).collect();
        for key in &expired {
            state.entries.remove(key);
            state.tags.remove_key(key);
        }
        self.metrics.incr_by("cache.l1.expirations", expired.len() as u64);
    }

    pub async fn l1_len(&self) -> usize {
        self.l1.read().await.entries.len()
    }
}

/// Approximate-LRU eviction: lowest hit counter wins, ties by earliest
/// expiry. Expired entries found along the way are dropped first and do
/// not count against the eviction budget (§4.E).
fn evict_one(state: &mut L1State) {
    let now = chrono::Utc::now();
    let expired_key = state.entries.iter().find(|(_, e)| e.is_expired(now)).map(|(k, _)| k.clone());
    if let Some(key) = expired_key {
        state.entries.remove(&key);
        state.tags.remove_key(&key);
        return;
    }

    let victim = state
        .entries
        .iter()
        .min_by(|(_, a), (_, b)| a.hits().cmp(&b.hits()).then_with(|| a.expires_at.cmp(&b.expires_at)))
        .map(|(k, _)| k.clone());
    if let Some(key) = victim {
        state.entries.remove(&key);
        state.tags.remove_key(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l2::InMemoryL2;

    fn test_cache() -> Cache {
        Cache::new(CacheConfig::default(), Some(Arc::new(InMemoryL2::new())), MetricsRegistry::new())
    }

    #[tokio::test]
    async fn round_trip_before_and_after_ttl() {
        let cache = test_cache();
        cache.set("k", b"v1".to_vec(), Duration::from_millis(50), vec![]).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v1".to_vec()));

        tokio::time::sleep(Duration::from_millis(80)).await;
        // L1 entry has expired; L2 (InMemoryL2) also uses its own clock with the same TTL.
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn tag_invalidation_drops_only_tagged_keys() {
        let cache = test_cache();
        cache.set("k1", b"v1".to_vec(), Duration::from_secs(3600), vec!["prov:x".into()]).await.unwrap();
        cache.set("k2", b"v2".to_vec(), Duration::from_secs(3600), vec!["prov:x".into(), "mdl:m".into()]).await.unwrap();
        cache.set("k3", b"v3".to_vec(), Duration::from_secs(3600), vec!["mdl:m".into()]).await.unwrap();

        cache.invalidate_by_tag("prov:x").await.unwrap();

        assert_eq!(cache.get("k1").await.unwrap(), None);
        assert_eq!(cache.get("k2").await.unwrap(), None);
        assert_eq!(cache.get("k3").await.unwrap(), Some(b"v3".to_vec()));
    }

    #[tokio::test]
    async fn eviction_prefers_lowest_hit_count() {
        let mut config = CacheConfig::default();
        config.l1_max_size = 2;
        config.enable_l2 = false;
        let cache = Cache::new(config, None, MetricsRegistry::new());

        cache.set("a", b"a".to_vec(), Duration::from_secs(3600), vec![]).await.unwrap();
        cache.set("b", b"b".to_vec(), Duration::from_secs(3600), vec![]).await.unwrap();
        // Hit "a" so it outlives "b" under approximate-LRU.
        cache.get("a").await.unwrap();
        cache.set("c", b"c".to_vec(), Duration::from_secs(3600), vec![]).await.unwrap();

        assert_eq!(cache.l1_len().await, 2);
        assert_eq!(cache.get("a").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(cache.get("b").await.unwrap(), None);
    }
}
