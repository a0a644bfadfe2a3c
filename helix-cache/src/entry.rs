//! Cache Entry (§3): value bytes, absolute expiry, tags, hit counter.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct CacheEntry {
    pub value: Vec<u8>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tags: Vec<String>,
    hits: AtomicU64,
}

impl CacheEntry {
    pub fn new(value: Vec<u8>, expires_at: chrono::DateTime<chrono::Utc>, tags: Vec<String>) -> Self {
        Self { value, expires_at, tags, hits: AtomicU64::new(0) }
    }

    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at <= now
    }

    /// Increments and returns the new hit count. Callers hold only a read
    /// lock over the containing map — the atomic makes that safe (§4.E
    /// read path: "increment hit counter" under a read lock).
    pub fn record_hit(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn remaining_ttl(&self, now: chrono::DateTime<chrono::Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
