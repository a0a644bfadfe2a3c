//! Invalidation Bus (§4.F): process-wide pub/sub routing domain events to
//! cache key/tag invalidations.

use crate::cache::Cache;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A rule registered against one topic. `handler` computes the extra tags
/// to drop beyond the literal `key_pattern`/static `tags`, for cases where
/// the tag to invalidate is only known from the event payload (e.g. which
/// provider changed health) — it must be pure and non-blocking (§4.F).
pub struct InvalidationRule {
    pub event_type: String,
    pub key_pattern: Option<String>,
    pub tags: Vec<String>,
    pub handler: Arc<dyn Fn(&DomainEvent) -> Vec<String> + Send + Sync>,
}

#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Single dispatcher task draining one per-topic-ordered FIFO channel.
/// Cross-topic order is explicitly not guaranteed (§5).
#[derive(Clone)]
pub struct InvalidationBus {
    rules: Arc<Mutex<Vec<InvalidationRule>>>,
    sender: mpsc::UnboundedSender<DomainEvent>,
}

impl InvalidationBus {
    pub fn new(cache: Cache) -> (Self, impl std::future::Future<Output = ()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DomainEvent>();
        let rules: Arc<Mutex<Vec<InvalidationRule>>> = Arc::new(Mutex::new(Vec::new()));
        let rules_for_dispatcher = rules.clone();

        let dispatcher = async move {
            while let Some(event) = receiver.recv().await {
                let matched: Vec<(Option<String>, Vec<String>, Vec<String>)> = {
                    let rules = rules_for_dispatcher.lock().await;
                    rules
                        .iter()
                        .filter(|r| r.event_type == event.topic)
                        .map(|r| (r.key_pattern.clone(), r.tags.clone(), (r.handler)(&event)))
                        .collect()
                };

                for (key_pattern, mut tags, dynamic_tags) in matched {
                    if let Some(prefix) = key_pattern {
                        let _ = cache.invalidate_prefix(&prefix).await;
                    }
                    tags.extend(dynamic_tags);
                    if !tags.is_empty() {
                        let _ = cache.invalidate_by_tags(&tags).await;
                    }
                }
            }
        };

        (Self { rules, sender }, dispatcher)
    }

    pub async fn subscribe(&self, rule: InvalidationRule) {
        self.rules.lock().await.push(rule);
    }

    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }
}
