//! Two-Tier Cache with tagged invalidation, and the Invalidation Bus, for
//! HelixAgent (§4.E, §4.F).

pub mod bus;
pub mod cache;
pub mod compression;
pub mod entry;
pub mod l2;
pub mod tag_index;

pub use bus::{DomainEvent, InvalidationBus, InvalidationRule};
pub use cache::{Cache, CacheConfig};
pub use l2::{InMemoryL2, L2Store};
#[cfg(feature = "redis-l2")]
pub use l2::RedisL2;
