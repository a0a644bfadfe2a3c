//! Rate-limit and circuit-breaker wrappers for HelixAgent provider
//! adapters (§4.H).

pub mod circuit_breaker;
pub mod guard;
pub mod token_bucket;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use guard::{GuardedAdapter, LimiterRegistry};
pub use token_bucket::{TokenBucket, TokenBucketConfig};
