//! Metadata caching.

mod stats;
pub mod ttl_cache;

pub use stats::CacheStats;
pub use ttl_cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL, TtlCache};
