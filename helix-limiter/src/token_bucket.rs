//! Token-bucket limiter keyed on `provider.id` (§4.H).

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { capacity: 10.0, refill_per_sec: 5.0 }
    }
}

pub struct TokenBucket {
    config: TokenBucketConfig,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(config: TokenBucketConfig) -> Self {
        Self { tokens: config.capacity, config, last_refill: Instant::now() }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.config.refill_per_sec).min(self.config.capacity);
        self.last_refill = now;
    }

    /// Attempts to take one token. Returns `false` (never blocks) when
    /// the bucket is empty — §5's backpressure rule: the limiter returns
    /// a `Throttled` outcome rather than blocking indefinitely.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Adopt refill/capacity observed from the backend's own rate-limit
    /// headers (§4.B: "Rate-limit headers... must be surfaced").
    pub fn reconfigure(&mut self, config: TokenBucketConfig) {
        self.refill();
        self.config = config;
        self.tokens = self.tokens.min(self.config.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refuses() {
        let mut bucket = TokenBucket::new(TokenBucketConfig { capacity: 2.0, refill_per_sec: 0.0 });
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }
}
