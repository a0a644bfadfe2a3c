//! In-process counters and histograms exposed for scraping (§4.I).
//!
//! Deliberately dependency-free (no `metrics`/`prometheus` crate) so the
//! registry can live in a library crate without pulling an exporter format
//! choice onto every consumer; `helix-server`'s `/health` and `/admin`
//! routes render a [`MetricsSnapshot`] in whatever shape the edge wants.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Histogram {
    count: AtomicU64,
    sum_millis: AtomicU64,
    max_millis: AtomicU64,
}

impl Histogram {
    fn observe(&self, millis: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_millis.fetch_add(millis, Ordering::Relaxed);
        self.max_millis.fetch_max(millis, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum_millis.load(Ordering::Relaxed);
        HistogramSnapshot {
            count,
            mean_millis: if count == 0 { 0.0 } else { sum as f64 / count as f64 },
            max_millis: self.max_millis.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub mean_millis: f64,
    pub max_millis: u64,
}

/// Process-wide counter/histogram registry. Cheap to clone (an `Arc`
/// internally) so every component holds a handle rather than threading a
/// reference through every call.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    inner: std::sync::Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    counters: RwLock<HashMap<String, AtomicU64>>,
    histograms: RwLock<HashMap<String, Histogram>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &str) {
        self.incr_by(name, 1);
    }

    pub fn incr_by(&self, name: &str, n: u64) {
        if let Some(c) = self.inner.counters.read().unwrap().get(name) {
            c.fetch_add(n, Ordering::Relaxed);
            return;
        }
        let mut counters = self.inner.counters.write().unwrap();
        counters.entry(name.to_string()).or_insert_with(|| AtomicU64::new(0)).fetch_add(n, Ordering::Relaxed);
    }

    pub fn observe_millis(&self, name: &str, millis: u64) {
        if let Some(h) = self.inner.histograms.read().unwrap().get(name) {
            h.observe(millis);
            return;
        }
        let mut histograms = self.inner.histograms.write().unwrap();
        let h = histograms.entry(name.to_string()).or_insert_with(Histogram::default);
        h.observe(millis);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .inner
            .counters
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        let histograms =
            self.inner.histograms.read().unwrap().iter().map(|(k, v)| (k.clone(), v.snapshot())).collect();
        MetricsSnapshot { counters, histograms }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub histograms: HashMap<String, HistogramSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_clones() {
        let reg = MetricsRegistry::new();
        let reg2 = reg.clone();
        reg.incr("cache.hit");
        reg2.incr("cache.hit");
        reg.incr_by("cache.hit", 3);
        assert_eq!(reg.snapshot().counters["cache.hit"], 5);
    }

    #[test]
    fn histogram_tracks_mean_and_max() {
        let reg = MetricsRegistry::new();
        reg.observe_millis("adapter.latency", 10);
        reg.observe_millis("adapter.latency", 30);
        let snap = reg.snapshot();
        let hist = &snap.histograms["adapter.latency"];
        assert_eq!(hist.count, 2);
        assert_eq!(hist.max_millis, 30);
        assert!((hist.mean_millis - 20.0).abs() < f64::EPSILON);
    }
}
